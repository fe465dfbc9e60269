use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::stream::StreamEmitter;
use crate::error::{AiError, Result};
use crate::llm::{LlmClient, ResponseFormat};
use crate::structured::{
    StructuredCompletion, StructuredProvider, StructuredRequest, collect_stream,
};

/// Forwards the typed schema to a backend with native constrained decoding.
pub struct NativeProvider {
    client: Arc<dyn LlmClient>,
    strict: bool,
}

impl NativeProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            strict: true,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[async_trait]
impl StructuredProvider for NativeProvider {
    fn name(&self) -> &str {
        "native"
    }

    async fn stream_completion(
        &self,
        request: StructuredRequest,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<StructuredCompletion> {
        let mut completion = request.base_completion(request.messages.clone());
        if let Some(output) = &request.output {
            completion = completion.with_response_format(ResponseFormat::JsonSchema {
                name: output.name.clone(),
                schema: output.schema.to_json_schema(),
                strict: self.strict,
            });
        }

        let (content, tool_calls) =
            collect_stream(self.client.as_ref(), completion, emitter, true).await?;

        let Some(output) = &request.output else {
            return Ok(StructuredCompletion {
                content,
                parsed: None,
                tool_calls,
            });
        };

        // Only the complete payload is parsed; partial JSON never escapes.
        let parsed = serde_json::from_str(content.trim())
            .map_err(AiError::from)
            .and_then(|value| output.schema.conform(value))
            .map_err(|e| {
                tracing::warn!(
                    schema_name = %output.name,
                    error = %e,
                    "Native structured output failed"
                );
                AiError::StructuredOutput(format!("{}: {e}", output.name))
            })?;

        Ok(StructuredCompletion {
            content,
            parsed: Some(parsed),
            tool_calls,
        })
    }
}
