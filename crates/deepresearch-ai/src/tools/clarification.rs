use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::context::SharedContext;
use crate::error::Result;
use crate::schema::{FieldSchema, RecordSchema, SchemaType};
use crate::tools::registry::ToolKind;
use crate::tools::traits::{ToolArgs, ToolEnv};

/// Questions for the requester when the task is ambiguous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationArgs {
    pub reasoning: String,
    pub unclear_terms: Vec<String>,
    pub assumptions: Vec<String>,
    pub questions: Vec<String>,
}

#[async_trait]
impl ToolArgs for ClarificationArgs {
    const KIND: ToolKind = ToolKind::Clarification;

    fn description() -> &'static str {
        "Ask clarifying questions when facing an ambiguous request."
    }

    fn schema() -> RecordSchema {
        RecordSchema::new("ClarificationTool", Self::description())
            .field(FieldSchema::new(
                "reasoning",
                "Why clarification is needed",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "unclear_terms",
                "List of unclear terms or concepts",
                SchemaType::string_list(1, 5),
            ))
            .field(FieldSchema::new(
                "assumptions",
                "Possible interpretations to verify",
                SchemaType::string_list(2, 4),
            ))
            .field(FieldSchema::new(
                "questions",
                "3-5 specific clarifying questions",
                SchemaType::string_list(3, 5),
            ))
    }

    async fn execute(&self, _ctx: &SharedContext, _env: &ToolEnv) -> Result<String> {
        Ok(self.questions.join("\n"))
    }
}
