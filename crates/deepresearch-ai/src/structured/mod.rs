//! Structured-output provider abstraction.
//!
//! Both strategies expose the same `stream_completion` call: text deltas go to
//! the emitter while the response is produced, and the parsed object and/or
//! tool calls are returned only once the stream has ended.
//!
//! - [`NativeProvider`] hands the typed schema to a backend that decodes it
//!   natively.
//! - [`CompiledProvider`] walks the fallback stages selected by [`SoMode`],
//!   compiling the schema when the backend needs plain JSON Schema.

mod compiled;
mod native;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::stream::{StreamEmitter, ToolCallAccumulator};
use crate::error::Result;
use crate::llm::{CompletionRequest, LlmClient, Message, ToolCall, ToolChoice};
use crate::schema::SchemaType;
use crate::tools::ToolSchema;

pub use compiled::{CompiledProvider, JSON_MODE_INSTRUCTION};
pub use native::NativeProvider;

/// Which provider implementation drives structured output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredStrategy {
    Native,
    Compiled,
}

/// Entry point into the fallback stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SoMode {
    #[default]
    Native,
    JsonSchema,
    JsonMode,
}

impl SoMode {
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Self::Native => &[Stage::Native, Stage::JsonSchema, Stage::JsonMode],
            Self::JsonSchema => &[Stage::JsonSchema, Stage::JsonMode],
            Self::JsonMode => &[Stage::JsonMode],
        }
    }
}

/// One fallback stage of the compiled strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Typed schema as strict response format
    Native,
    /// Compiled schema as strict response format
    JsonSchema,
    /// JSON object mode with the schema in the system prompt
    JsonMode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::JsonSchema => "json_schema",
            Self::JsonMode => "json_mode",
        })
    }
}

/// Named typed schema the response must satisfy
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub schema: SchemaType,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: SchemaType) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// A completion request constrained by a schema or a tool list
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub messages: Vec<Message>,
    pub output: Option<OutputSchema>,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl StructuredRequest {
    /// Request a single object matching `output`.
    pub fn with_output(messages: Vec<Message>, output: OutputSchema) -> Self {
        Self {
            messages,
            output: Some(output),
            tools: Vec::new(),
            tool_choice: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Request tool calls from `tools`.
    pub fn with_tools(messages: Vec<Message>, tools: Vec<ToolSchema>, choice: ToolChoice) -> Self {
        Self {
            messages,
            output: None,
            tools,
            tool_choice: Some(choice),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn base_completion(&self, messages: Vec<Message>) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages).with_tools(self.tools.clone());
        request.tool_choice = self.tool_choice.clone();
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request
    }
}

/// Final result of a structured completion
#[derive(Debug, Clone, Default)]
pub struct StructuredCompletion {
    /// Raw assistant text, or the canonical JSON payload for schema requests
    pub content: String,
    /// Validated object when an output schema was requested
    pub parsed: Option<Value>,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait StructuredProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn stream_completion(
        &self,
        request: StructuredRequest,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<StructuredCompletion>;
}

/// Build the provider for a strategy.
pub fn create_provider(
    strategy: StructuredStrategy,
    client: Arc<dyn LlmClient>,
    so_mode: SoMode,
    strict: bool,
    allow_additional_properties: bool,
) -> Arc<dyn StructuredProvider> {
    match strategy {
        StructuredStrategy::Native => Arc::new(NativeProvider::new(client).with_strict(strict)),
        StructuredStrategy::Compiled => Arc::new(
            CompiledProvider::new(client)
                .with_so_mode(so_mode)
                .with_strict(strict)
                .with_additional_properties(allow_additional_properties),
        ),
    }
}

/// Drain one completion stream, optionally forwarding text deltas.
pub(crate) async fn collect_stream(
    client: &dyn LlmClient,
    request: CompletionRequest,
    emitter: &mut dyn StreamEmitter,
    forward_text: bool,
) -> Result<(String, Vec<ToolCall>)> {
    let mut stream = client.complete_stream(request);
    let mut content = String::new();
    let mut tool_calls = ToolCallAccumulator::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.text.is_empty() {
            if forward_text {
                emitter.emit_text_delta(&chunk.text).await;
            }
            content.push_str(&chunk.text);
        }
        if let Some(delta) = &chunk.tool_call_delta {
            tool_calls.accumulate(delta);
        }
    }

    Ok((content, tool_calls.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_so_mode_stage_order() {
        assert_eq!(
            SoMode::Native.stages(),
            &[Stage::Native, Stage::JsonSchema, Stage::JsonMode]
        );
        assert_eq!(SoMode::JsonSchema.stages(), &[Stage::JsonSchema, Stage::JsonMode]);
        assert_eq!(SoMode::JsonMode.stages(), &[Stage::JsonMode]);
    }

    #[test]
    fn test_so_mode_serde() {
        let mode: SoMode = serde_json::from_str("\"json_schema\"").unwrap();
        assert_eq!(mode, SoMode::JsonSchema);
        assert_eq!(Stage::JsonMode.to_string(), "json_mode");
    }
}
