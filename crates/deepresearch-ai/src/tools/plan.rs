//! Research planning tools

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::context::SharedContext;
use crate::error::Result;
use crate::schema::{FieldSchema, RecordSchema, SchemaType};
use crate::tools::registry::ToolKind;
use crate::tools::traits::{ToolArgs, ToolEnv};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratePlanArgs {
    pub reasoning: String,
    pub research_goal: String,
    pub planned_steps: Vec<String>,
    pub search_strategies: Vec<String>,
}

#[async_trait]
impl ToolArgs for GeneratePlanArgs {
    const KIND: ToolKind = ToolKind::GeneratePlan;

    fn description() -> &'static str {
        "Generate a research plan. Useful to split a complex request into manageable steps."
    }

    fn schema() -> RecordSchema {
        RecordSchema::new("GeneratePlanTool", Self::description())
            .field(FieldSchema::new(
                "reasoning",
                "Justification for the research approach",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "research_goal",
                "Primary research objective",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "planned_steps",
                "List of 3-4 planned steps",
                SchemaType::string_list(3, 4),
            ))
            .field(FieldSchema::new(
                "search_strategies",
                "Information search strategies",
                SchemaType::string_list(2, 3),
            ))
    }

    async fn execute(&self, _ctx: &SharedContext, _env: &ToolEnv) -> Result<String> {
        Ok(serde_json::to_string_pretty(&json!({
            "research_goal": self.research_goal,
            "planned_steps": self.planned_steps,
            "search_strategies": self.search_strategies,
        }))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptPlanArgs {
    pub reasoning: String,
    pub original_goal: String,
    pub new_goal: String,
    pub plan_changes: Vec<String>,
    pub next_steps: Vec<String>,
}

#[async_trait]
impl ToolArgs for AdaptPlanArgs {
    const KIND: ToolKind = ToolKind::AdaptPlan;

    fn description() -> &'static str {
        "Adapt the research plan based on new findings."
    }

    fn schema() -> RecordSchema {
        RecordSchema::new("AdaptPlanTool", Self::description())
            .field(FieldSchema::new(
                "reasoning",
                "Why the plan needs adaptation based on new data",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "original_goal",
                "Original research goal",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "new_goal",
                "Updated research goal",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "plan_changes",
                "Specific changes made to the plan",
                SchemaType::string_list(1, 3),
            ))
            .field(FieldSchema::new(
                "next_steps",
                "Updated remaining steps",
                SchemaType::string_list(2, 4),
            ))
    }

    async fn execute(&self, _ctx: &SharedContext, _env: &ToolEnv) -> Result<String> {
        Ok(serde_json::to_string_pretty(&json!({
            "original_goal": self.original_goal,
            "new_goal": self.new_goal,
            "plan_changes": self.plan_changes,
            "next_steps": self.next_steps,
        }))?)
    }
}
