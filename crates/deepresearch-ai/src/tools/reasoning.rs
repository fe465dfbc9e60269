use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::context::SharedContext;
use crate::error::Result;
use crate::schema::{FieldSchema, RecordSchema, SchemaType};
use crate::tools::registry::ToolKind;
use crate::tools::traits::{ToolArgs, ToolEnv};

/// Situation assessment produced before every action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningArgs {
    pub reasoning_steps: Vec<String>,
    pub current_situation: String,
    pub plan_status: String,
    #[serde(default)]
    pub enough_data: bool,
    pub remaining_steps: Vec<String>,
    pub task_completed: bool,
}

impl ReasoningArgs {
    /// Text shown as the assistant turn preceding the action call.
    pub fn next_step_summary(&self) -> &str {
        self.remaining_steps
            .first()
            .map(String::as_str)
            .unwrap_or("Completing")
    }

    /// Reasoning fields shared with the next-step record.
    pub fn fields() -> Vec<FieldSchema> {
        vec![
            FieldSchema::new(
                "reasoning_steps",
                "Step-by-step reasoning process leading to the decision",
                SchemaType::string_list(2, 4),
            ),
            FieldSchema::new(
                "current_situation",
                "Current research situation analysis",
                SchemaType::String,
            ),
            FieldSchema::new(
                "plan_status",
                "Status of current plan execution",
                SchemaType::String,
            ),
            FieldSchema::new(
                "enough_data",
                "Sufficient data collected for a comprehensive report?",
                SchemaType::Boolean,
            )
            .with_default(serde_json::Value::Bool(false)),
            FieldSchema::new(
                "remaining_steps",
                "1-3 remaining steps to complete the task",
                SchemaType::string_list(1, 3),
            ),
            FieldSchema::new(
                "task_completed",
                "Is the research task finished?",
                SchemaType::Boolean,
            ),
        ]
    }
}

#[async_trait]
impl ToolArgs for ReasoningArgs {
    const KIND: ToolKind = ToolKind::Reasoning;

    fn description() -> &'static str {
        "Agent core: determine the next reasoning step with adaptive planning."
    }

    fn schema() -> RecordSchema {
        let mut record = RecordSchema::new("ReasoningTool", Self::description());
        record.fields = Self::fields();
        record
    }

    async fn execute(&self, _ctx: &SharedContext, _env: &ToolEnv) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
