//! Per-iteration tool-set computation and the next-step decision schema
//!
//! The permitted set is recomputed from the research context on every
//! iteration. It drives three things: the tagged union offered to the model,
//! the function declarations for tool-calling agents, and validation of
//! whatever the model picked.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::context::ResearchContext;
use crate::error::{AiError, Result};
use crate::schema::{FieldSchema, RecordSchema, SchemaType};
use crate::structured::OutputSchema;
use crate::tools::{ReasoningArgs, ResearchTool, ToolKind, ToolSchema};

pub const NEXT_STEP_SCHEMA_NAME: &str = "NextStep";

/// Session caps that shrink the permitted tool set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budgets {
    pub max_iterations: usize,
    pub max_clarifications: usize,
    pub max_searches: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_clarifications: 3,
            max_searches: 4,
        }
    }
}

/// Ordered list of tools the model may select this iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    kinds: Vec<ToolKind>,
}

impl ToolSet {
    /// Apply the budget rules to `enabled`.
    pub fn compute(enabled: &[ToolKind], ctx: &ResearchContext, budgets: &Budgets) -> Self {
        let mut kinds: Vec<ToolKind> = if ctx.iteration >= budgets.max_iterations {
            vec![ToolKind::CreateReport, ToolKind::AgentCompletion]
        } else {
            let mut kinds = Vec::with_capacity(enabled.len());
            for kind in enabled {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
            kinds
        };

        if ctx.clarifications_used >= budgets.max_clarifications {
            kinds.retain(|k| *k != ToolKind::Clarification);
        }
        if ctx.searches_used >= budgets.max_searches {
            kinds.retain(|k| *k != ToolKind::WebSearch);
        }

        Self { kinds }
    }

    pub fn kinds(&self) -> &[ToolKind] {
        &self.kinds
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Tagged union over the permitted tools, one branch per key
    pub fn function_union(&self) -> SchemaType {
        SchemaType::TaggedUnion(self.kinds.iter().map(ToolKind::branch_schema).collect())
    }

    /// Reasoning fields plus the `function` union
    pub fn next_step_record(&self) -> RecordSchema {
        let mut record = RecordSchema::new(
            NEXT_STEP_SCHEMA_NAME,
            "Determine the next reasoning step with adaptive planning and choose the tool to run",
        );
        record.fields = ReasoningArgs::fields();
        record.fields.push(FieldSchema::new(
            "function",
            "Select the appropriate tool for the next step: ask for clarification when the \
             request is unclear, plan when it is clear, search for data, adapt the plan when \
             findings conflict, report when enough data is collected, then complete",
            self.function_union(),
        ));
        record
    }

    pub fn next_step_schema(&self) -> OutputSchema {
        OutputSchema::new(
            NEXT_STEP_SCHEMA_NAME,
            SchemaType::Object(self.next_step_record()),
        )
    }

    /// Function declarations for tool-calling agents
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.kinds.iter().map(ToolKind::tool_schema).collect()
    }

    /// Reject tools outside the permitted set.
    pub fn validate(&self, tool: &ResearchTool) -> Result<()> {
        let kind = tool.kind();
        if self.contains(kind) {
            return Ok(());
        }
        Err(AiError::ToolNotPermitted(format!(
            "'{kind}' is not available this step (permitted: {})",
            self.kinds
                .iter()
                .map(ToolKind::name)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Split a conformed next-step object into reasoning and action.
    pub fn parse_decision(&self, value: Value) -> Result<NextStep> {
        let Value::Object(mut map) = self.next_step_record().conform(value)? else {
            return Err(AiError::InvalidFormat("next step is not an object".into()));
        };
        let function = map
            .remove("function")
            .ok_or_else(|| AiError::InvalidFormat("next step has no function".into()))?;
        let function = ResearchTool::from_tagged(function)?;
        self.validate(&function)?;
        let reasoning: ReasoningArgs = serde_json::from_value(Value::Object(map))?;
        Ok(NextStep {
            reasoning,
            function,
        })
    }
}

/// One decoded decision: the assessment and the single tool it selects
#[derive(Debug, Clone, PartialEq)]
pub struct NextStep {
    pub reasoning: ReasoningArgs,
    pub function: ResearchTool,
}
