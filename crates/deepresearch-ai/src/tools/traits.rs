//! Tool trait and types for research tools

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::context::SharedContext;
use crate::error::Result;
use crate::schema::RecordSchema;
use crate::tools::registry::ToolKind;
use crate::tools::report::ReportStore;
use crate::tools::search::SearchProvider;

/// Default cap on full page content quoted back to the model
pub const DEFAULT_CONTENT_LIMIT: usize = 1500;

/// JSON Schema for tool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema object
}

/// External collaborators available to tool executions
#[derive(Clone)]
pub struct ToolEnv {
    pub search: Arc<dyn SearchProvider>,
    pub reports: Arc<dyn ReportStore>,
    pub content_limit: usize,
}

impl ToolEnv {
    pub fn new(search: Arc<dyn SearchProvider>, reports: Arc<dyn ReportStore>) -> Self {
        Self {
            search,
            reports,
            content_limit: DEFAULT_CONTENT_LIMIT,
        }
    }

    pub fn with_content_limit(mut self, limit: usize) -> Self {
        self.content_limit = limit;
        self
    }
}

/// Validated arguments of one tool kind, plus its executor
#[async_trait]
pub trait ToolArgs: Serialize + DeserializeOwned + Send + Sync {
    const KIND: ToolKind;

    /// Model-facing instruction describing when to use the tool
    fn description() -> &'static str;

    /// Field schema, without the discriminator
    fn schema() -> RecordSchema;

    /// Run the tool against the session; the text result goes back to the model.
    async fn execute(&self, ctx: &SharedContext, env: &ToolEnv) -> Result<String>;
}
