//! Tool registration table and the tool-call sum type
//!
//! Every research tool is registered here once under a stable key. The key
//! doubles as the tagged-union discriminator the model fills in, so the same
//! table drives schema construction, decision decoding and dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::agent::context::SharedContext;
use crate::error::{AiError, Result};
use crate::schema::{DISCRIMINATOR_FIELD, FieldSchema, RecordSchema, SchemaType};
use crate::tools::clarification::ClarificationArgs;
use crate::tools::completion::AgentCompletionArgs;
use crate::tools::plan::{AdaptPlanArgs, GeneratePlanArgs};
use crate::tools::reasoning::ReasoningArgs;
use crate::tools::report::CreateReportArgs;
use crate::tools::traits::{ToolArgs, ToolEnv, ToolSchema};
use crate::tools::web_search::WebSearchArgs;

/// Stable key of a registered tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Clarification,
    GeneratePlan,
    AdaptPlan,
    WebSearch,
    CreateReport,
    AgentCompletion,
    Reasoning,
}

/// Registration entry: description and field schema for one key
#[derive(Debug, Clone, Copy)]
pub struct ToolRegistration {
    pub kind: ToolKind,
    pub description: fn() -> &'static str,
    pub schema: fn() -> RecordSchema,
}

fn register<T: ToolArgs>() -> ToolRegistration {
    ToolRegistration {
        kind: T::KIND,
        description: T::description,
        schema: T::schema,
    }
}

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::Clarification,
        ToolKind::GeneratePlan,
        ToolKind::AdaptPlan,
        ToolKind::WebSearch,
        ToolKind::CreateReport,
        ToolKind::AgentCompletion,
        ToolKind::Reasoning,
    ];

    /// Tools that can be selected as the action of a step.
    pub const ACTIONS: [ToolKind; 6] = [
        ToolKind::Clarification,
        ToolKind::GeneratePlan,
        ToolKind::AdaptPlan,
        ToolKind::WebSearch,
        ToolKind::CreateReport,
        ToolKind::AgentCompletion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Clarification => "clarification",
            Self::GeneratePlan => "generate_plan",
            Self::AdaptPlan => "adapt_plan",
            Self::WebSearch => "web_search",
            Self::CreateReport => "create_report",
            Self::AgentCompletion => "agent_completion",
            Self::Reasoning => "reasoning",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn registration(&self) -> ToolRegistration {
        match self {
            Self::Clarification => register::<ClarificationArgs>(),
            Self::GeneratePlan => register::<GeneratePlanArgs>(),
            Self::AdaptPlan => register::<AdaptPlanArgs>(),
            Self::WebSearch => register::<WebSearchArgs>(),
            Self::CreateReport => register::<CreateReportArgs>(),
            Self::AgentCompletion => register::<AgentCompletionArgs>(),
            Self::Reasoning => register::<ReasoningArgs>(),
        }
    }

    pub fn description(&self) -> &'static str {
        (self.registration().description)()
    }

    /// Argument record without the discriminator
    pub fn args_schema(&self) -> RecordSchema {
        (self.registration().schema)()
    }

    /// Argument record as a union branch, tagged with this tool's key
    pub fn branch_schema(&self) -> RecordSchema {
        let mut record = self.args_schema();
        record.fields.insert(
            0,
            FieldSchema::new(
                DISCRIMINATOR_FIELD,
                "Tool to invoke",
                SchemaType::Literal(self.name().to_string()),
            ),
        );
        record
    }

    /// Function-calling declaration for this tool
    pub fn tool_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.args_schema().to_json_schema(),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded tool call, whichever tool it targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool_name_discriminator", rename_all = "snake_case")]
pub enum ResearchTool {
    Clarification(ClarificationArgs),
    GeneratePlan(GeneratePlanArgs),
    AdaptPlan(AdaptPlanArgs),
    WebSearch(WebSearchArgs),
    CreateReport(CreateReportArgs),
    AgentCompletion(AgentCompletionArgs),
    Reasoning(ReasoningArgs),
}

impl ResearchTool {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Clarification(_) => ToolKind::Clarification,
            Self::GeneratePlan(_) => ToolKind::GeneratePlan,
            Self::AdaptPlan(_) => ToolKind::AdaptPlan,
            Self::WebSearch(_) => ToolKind::WebSearch,
            Self::CreateReport(_) => ToolKind::CreateReport,
            Self::AgentCompletion(_) => ToolKind::AgentCompletion,
            Self::Reasoning(_) => ToolKind::Reasoning,
        }
    }

    /// Decode a tagged payload, validating it against the branch schema.
    pub fn from_tagged(value: Value) -> Result<Self> {
        let kind = value
            .get(DISCRIMINATOR_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AiError::InvalidFormat(format!("missing discriminator '{DISCRIMINATOR_FIELD}'"))
            })?;
        let kind = ToolKind::from_name(kind)
            .ok_or_else(|| AiError::Tool(format!("Unknown tool: {kind}")))?;
        let conformed = kind.branch_schema().conform(value)?;
        Ok(serde_json::from_value(conformed)?)
    }

    /// Decode a function call by tool name and untagged arguments.
    pub fn from_call(name: &str, arguments: Value) -> Result<Self> {
        let kind =
            ToolKind::from_name(name).ok_or_else(|| AiError::Tool(format!("Unknown tool: {name}")))?;
        let mut map = match arguments {
            Value::Object(map) => map,
            Value::String(raw) => serde_json::from_str::<Map<String, Value>>(&raw).map_err(|e| {
                AiError::InvalidFormat(format!("arguments for {name} are not an object: {e}"))
            })?,
            other => {
                return Err(AiError::InvalidFormat(format!(
                    "arguments for {name} are not an object: {other}"
                )));
            }
        };
        map.insert(DISCRIMINATOR_FIELD.to_string(), json!(kind.name()));
        Self::from_tagged(Value::Object(map))
    }

    /// Arguments without the discriminator, as announced to stream consumers.
    pub fn arguments(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove(DISCRIMINATOR_FIELD);
        }
        Ok(value)
    }

    pub async fn execute(&self, ctx: &SharedContext, env: &ToolEnv) -> Result<String> {
        match self {
            Self::Clarification(args) => args.execute(ctx, env).await,
            Self::GeneratePlan(args) => args.execute(ctx, env).await,
            Self::AdaptPlan(args) => args.execute(ctx, env).await,
            Self::WebSearch(args) => args.execute(ctx, env).await,
            Self::CreateReport(args) => args.execute(ctx, env).await,
            Self::AgentCompletion(args) => args.execute(ctx, env).await,
            Self::Reasoning(args) => args.execute(ctx, env).await,
        }
    }
}
