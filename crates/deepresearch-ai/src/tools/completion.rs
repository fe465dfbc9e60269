use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::context::SharedContext;
use crate::agent::state::AgentStatus;
use crate::error::Result;
use crate::schema::{FieldSchema, RecordSchema, SchemaType};
use crate::tools::registry::ToolKind;
use crate::tools::traits::{ToolArgs, ToolEnv};

/// Terminal status reported by the completion tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Failed,
}

impl From<CompletionStatus> for AgentStatus {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::Completed => AgentStatus::Completed,
            CompletionStatus::Failed => AgentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCompletionArgs {
    pub reasoning: String,
    pub completed_steps: Vec<String>,
    pub status: CompletionStatus,
}

#[async_trait]
impl ToolArgs for AgentCompletionArgs {
    const KIND: ToolKind = ToolKind::AgentCompletion;

    fn description() -> &'static str {
        "Finalize the research task and complete agent execution after all steps are completed."
    }

    fn schema() -> RecordSchema {
        RecordSchema::new("AgentCompletionTool", Self::description())
            .field(FieldSchema::new(
                "reasoning",
                "Why the task is now complete",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "completed_steps",
                "Summary of completed steps",
                SchemaType::string_list(1, 5),
            ))
            .field(FieldSchema::new(
                "status",
                "Task completion status",
                SchemaType::enumeration(["completed", "failed"]),
            ))
    }

    async fn execute(&self, ctx: &SharedContext, _env: &ToolEnv) -> Result<String> {
        ctx.lock().state = self.status.into();
        Ok(serde_json::to_string_pretty(self)?)
    }
}
