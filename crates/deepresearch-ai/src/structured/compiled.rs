use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::stream::{NullEmitter, StreamEmitter};
use crate::error::{AiError, Result};
use crate::llm::{LlmClient, Message, ResponseFormat, Role};
use crate::schema::{
    CompiledSchema, JSON_CHUNK_SIZE, SchemaCompiler, iter_json_chunks, soft_json_parse,
};
use crate::structured::{
    OutputSchema, SoMode, Stage, StructuredCompletion, StructuredProvider, StructuredRequest,
    collect_stream,
};

pub const JSON_MODE_INSTRUCTION: &str = "You MUST respond with a strict JSON object that matches the provided schema. \
Return only valid JSON without explanations, markdown, or trailing text.";

/// Structured output for backends without reliable native decoding.
///
/// Stages run in the order given by [`SoMode`]; the first one producing a
/// value that satisfies the typed schema wins. The winning payload is then
/// re-emitted in fixed-size chunks so consumers still see a stream.
pub struct CompiledProvider {
    client: Arc<dyn LlmClient>,
    compiler: SchemaCompiler,
    so_mode: SoMode,
    strict: bool,
}

impl CompiledProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            compiler: SchemaCompiler::default(),
            so_mode: SoMode::default(),
            strict: true,
        }
    }

    pub fn with_so_mode(mut self, so_mode: SoMode) -> Self {
        self.so_mode = so_mode;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_additional_properties(mut self, allow: bool) -> Self {
        self.compiler = SchemaCompiler::new(allow);
        self
    }

    async fn run_stage(
        &self,
        stage: Stage,
        request: &StructuredRequest,
        output: &OutputSchema,
        compiled: &std::result::Result<CompiledSchema, String>,
    ) -> Result<Value> {
        match stage {
            Stage::Native => {
                let completion = request
                    .base_completion(request.messages.clone())
                    .with_response_format(ResponseFormat::JsonSchema {
                        name: output.name.clone(),
                        schema: output.schema.to_json_schema(),
                        strict: self.strict,
                    });
                let content = self.fetch_text(completion).await?;
                let value = serde_json::from_str(content.trim())?;
                output.schema.conform(value)
            }
            Stage::JsonSchema => {
                let compiled = compiled
                    .as_ref()
                    .map_err(|reason| AiError::SchemaTooComplex(reason.clone()))?;
                let completion = request
                    .base_completion(request.messages.clone())
                    .with_response_format(ResponseFormat::JsonSchema {
                        name: compiled.name.clone(),
                        schema: compiled.schema.clone(),
                        strict: self.strict,
                    });
                let content = self.fetch_text(completion).await?;
                let value = serde_json::from_str(content.trim())?;
                output.schema.conform(compiled.apply(value)?)
            }
            Stage::JsonMode => {
                let schema = match compiled {
                    Ok(compiled) => compiled.schema.clone(),
                    Err(_) => output.schema.to_json_schema(),
                };
                let messages = with_json_instruction(&request.messages, &output.name, &schema);
                let completion = request
                    .base_completion(messages)
                    .with_response_format(ResponseFormat::JsonObject);
                let content = self.fetch_text(completion).await?;
                let value = soft_json_parse(&content)?;
                let value = match compiled {
                    Ok(compiled) => compiled.apply(value)?,
                    Err(_) => value,
                };
                output.schema.conform(value)
            }
        }
    }

    async fn fetch_text(&self, completion: crate::llm::CompletionRequest) -> Result<String> {
        let (content, _) =
            collect_stream(self.client.as_ref(), completion, &mut NullEmitter, false).await?;
        Ok(content)
    }
}

/// Append the JSON-mode instruction and schema to the system turn.
fn with_json_instruction(messages: &[Message], schema_name: &str, schema: &Value) -> Vec<Message> {
    let schema_text =
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    let instruction = format!("{JSON_MODE_INSTRUCTION}\nSchema {schema_name}:\n{schema_text}");

    let mut messages = messages.to_vec();
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            if first.content.is_empty() {
                first.content = instruction;
            } else {
                first.content = format!("{}\n\n{instruction}", first.content);
            }
        }
        _ => messages.insert(0, Message::system(instruction)),
    }
    messages
}

#[async_trait]
impl StructuredProvider for CompiledProvider {
    fn name(&self) -> &str {
        "compiled"
    }

    async fn stream_completion(
        &self,
        request: StructuredRequest,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<StructuredCompletion> {
        let Some(output) = request.output.clone() else {
            let completion = request.base_completion(request.messages.clone());
            let (content, tool_calls) =
                collect_stream(self.client.as_ref(), completion, emitter, true).await?;
            return Ok(StructuredCompletion {
                content,
                parsed: None,
                tool_calls,
            });
        };

        let compiled = self
            .compiler
            .compile(&output.name, &output.schema)
            .map_err(|e| e.to_string());

        let mut last_error: Option<AiError> = None;
        for &stage in self.so_mode.stages() {
            match self.run_stage(stage, &request, &output, &compiled).await {
                Ok(value) => {
                    tracing::info!(
                        stage = %stage,
                        schema_name = %output.name,
                        "Structured output succeeded"
                    );
                    let payload = serde_json::to_string_pretty(&value)?;
                    for chunk in iter_json_chunks(&payload, JSON_CHUNK_SIZE) {
                        emitter.emit_text_delta(&chunk).await;
                    }
                    return Ok(StructuredCompletion {
                        content: payload,
                        parsed: Some(value),
                        tool_calls: Vec::new(),
                    });
                }
                Err(e) if !e.is_structured_failure() => {
                    tracing::error!(
                        stage = %stage,
                        schema_name = %output.name,
                        error = %e,
                        "Structured output request failed"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        stage = %stage,
                        schema_name = %output.name,
                        error = %e,
                        "Structured output stage failed, falling through"
                    );
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no stages configured".to_string());
        Err(AiError::StructuredOutput(format!(
            "structured output failed after retries: {reason}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::stream::{OutputChannel, StreamEvent};
    use crate::llm::{MockLlmClient, MockStep};
    use crate::schema::{DISCRIMINATOR_FIELD, FieldSchema, RecordSchema, SchemaType};
    use serde_json::json;

    fn decision_schema() -> OutputSchema {
        let branch = RecordSchema::new("Search", "")
            .field(FieldSchema::new(
                DISCRIMINATOR_FIELD,
                "",
                SchemaType::Literal("web_search".to_string()),
            ))
            .field(FieldSchema::new("query", "", SchemaType::String));
        OutputSchema::new(
            "NextStep",
            SchemaType::Object(
                RecordSchema::new("NextStep", "")
                    .field(FieldSchema::new("plan_status", "", SchemaType::String))
                    .field(FieldSchema::new(
                        "function",
                        "",
                        SchemaType::TaggedUnion(vec![branch]),
                    )),
            ),
        )
    }

    fn request(output: OutputSchema) -> StructuredRequest {
        StructuredRequest::with_output(
            vec![Message::system("You are a researcher."), Message::user("task")],
            output,
        )
    }

    #[tokio::test]
    async fn test_native_stage_succeeds_first() {
        let client = MockLlmClient::from_steps(
            "m",
            vec![MockStep::json(json!({
                "plan_status": "ok",
                "function": {"tool_name_discriminator": "web_search", "query": "q"}
            }))],
        );
        let provider = CompiledProvider::new(Arc::new(client.clone()));

        let result = provider
            .stream_completion(request(decision_schema()), &mut NullEmitter)
            .await
            .unwrap();
        assert_eq!(result.parsed.unwrap()["function"]["query"], "q");
        assert_eq!(client.recorded_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_json_schema_stage_restores_discriminator() {
        let client = MockLlmClient::from_steps(
            "m",
            vec![MockStep::json(json!({
                "plan_status": "ok",
                "function": {"kind": "web_search", "query": "q"}
            }))],
        );
        let provider =
            CompiledProvider::new(Arc::new(client.clone())).with_so_mode(SoMode::JsonSchema);

        let result = provider
            .stream_completion(request(decision_schema()), &mut NullEmitter)
            .await
            .unwrap();
        assert_eq!(
            result.parsed.unwrap()["function"][DISCRIMINATOR_FIELD],
            "web_search"
        );
        let sent = client.recorded_requests().await;
        let Some(ResponseFormat::JsonSchema { schema, .. }) = &sent[0].response_format else {
            panic!("expected json_schema response format");
        };
        assert_eq!(
            schema["properties"]["function"]["discriminator"]["propertyName"],
            "kind"
        );
    }

    #[tokio::test]
    async fn test_json_mode_appends_instruction_to_system_prompt() {
        let client = MockLlmClient::from_steps(
            "m",
            vec![MockStep::text(
                "Sure! {\"plan_status\": \"ok\", \"function\": {\"kind\": \"web_search\", \"query\": \"q\"}} Done.",
            )],
        );
        let provider =
            CompiledProvider::new(Arc::new(client.clone())).with_so_mode(SoMode::JsonMode);

        let result = provider
            .stream_completion(request(decision_schema()), &mut NullEmitter)
            .await
            .unwrap();
        assert!(result.parsed.is_some());

        let sent = client.recorded_requests().await;
        assert_eq!(sent[0].response_format, Some(ResponseFormat::JsonObject));
        let system = &sent[0].messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with("You are a researcher.\n\n"));
        assert!(system.content.contains(JSON_MODE_INSTRUCTION));
        assert!(system.content.contains("Schema NextStep:"));
    }

    #[tokio::test]
    async fn test_all_stages_failing_aggregates_error() {
        let client = MockLlmClient::from_steps(
            "m",
            vec![
                MockStep::text("nope"),
                MockStep::text("still nope"),
                MockStep::text("no object at all"),
            ],
        );
        let provider = CompiledProvider::new(Arc::new(client));

        let err = provider
            .stream_completion(request(decision_schema()), &mut NullEmitter)
            .await
            .unwrap_err();
        let AiError::StructuredOutput(message) = err else {
            panic!("expected structured output error");
        };
        assert!(message.starts_with("structured output failed after retries:"));
        assert!(message.contains("no JSON object"));
    }

    #[tokio::test]
    async fn test_success_is_reemitted_in_fixed_chunks() {
        let long_query = "x".repeat(300);
        let client = MockLlmClient::from_steps(
            "m",
            vec![MockStep::json(json!({
                "plan_status": "ok",
                "function": {"tool_name_discriminator": "web_search", "query": long_query}
            }))],
        );
        let provider = CompiledProvider::new(Arc::new(client));
        let mut channel = OutputChannel::new();

        let result = provider
            .stream_completion(request(decision_schema()), &mut channel)
            .await
            .unwrap();

        let deltas: Vec<String> = channel
            .snapshot()
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::TextDelta { content } => Some(content),
                _ => None,
            })
            .collect();
        assert!(deltas.len() > 2);
        assert!(deltas[..deltas.len() - 1].iter().all(|d| d.chars().count() == 128));
        assert_eq!(deltas.concat(), result.content);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_fall_through() {
        let client = MockLlmClient::from_steps(
            "m",
            vec![
                MockStep::error("HTTP 401 unauthorized"),
                MockStep::json(json!({
                    "plan_status": "ok",
                    "function": {"tool_name_discriminator": "web_search", "query": "q"}
                })),
            ],
        );
        let provider = CompiledProvider::new(Arc::new(client.clone()));

        let err = provider
            .stream_completion(request(decision_schema()), &mut NullEmitter)
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Llm(ref m) if m.contains("401")));
        assert_eq!(client.recorded_requests().await.len(), 1);
        assert_eq!(client.remaining_steps().await, 1);
    }

    #[test]
    fn test_instruction_inserted_when_no_system_message() {
        let messages = with_json_instruction(&[Message::user("hi")], "S", &json!({}));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.ends_with("Schema S:\n{}"));
    }
}
