//! OpenAI-compatible chat completions backed by research agents
//!
//! A request either starts a new agent (the `model` names an agent variant)
//! or answers a pending clarification (the `model` is the id of an agent
//! that is waiting). Both return an SSE stream of `chat.completion.chunk`
//! frames that ends at the next pause or when the agent finishes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use deepresearch_ai::agent::ChannelReader;
use deepresearch_ai::{AgentKind, AgentStatus, ResearchAgent, StreamEvent};
use futures::{StreamExt, stream};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{ApiError, state::AppState};

pub const AGENT_ID_HEADER: &str = "x-agent-id";
pub const AGENT_MODEL_HEADER: &str = "x-agent-model";

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: String,
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    /// Agent variant, or the id of an agent waiting for clarification
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ChatCompletionRequest {
    fn last_user_content(&self) -> Result<&str, ApiError> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .ok_or_else(|| ApiError::bad_request("User message not found in messages"))
    }
}

/// Agent ids are `<prefix>_<uuid>`; variant names never contain `_`.
fn looks_like_agent_id(model: &str) -> bool {
    model.contains('_') && model.len() > 20
}

fn resolve_kind(model: Option<&str>) -> Result<AgentKind, ApiError> {
    match model {
        None => Ok(AgentKind::Sgr),
        Some(model) if looks_like_agent_id(model) => Ok(AgentKind::Sgr),
        Some(model) => AgentKind::from_model_name(model).ok_or_else(|| {
            let available: Vec<&str> = AgentKind::ALL.iter().map(AgentKind::model_name).collect();
            ApiError::bad_request(format!(
                "Invalid model '{model}'. Available models: {}",
                available.join(", ")
            ))
        }),
    }
}

// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    if !request.stream {
        return Err(ApiError::streaming_required());
    }

    if let Some(model) = request.model.as_deref()
        && looks_like_agent_id(model)
        && let Some(agent) = state.registry.find(model)
        && agent.state() == AgentStatus::WaitingForClarification
    {
        return clarify(agent, &request);
    }

    let task = request.last_user_content()?;
    let kind = resolve_kind(request.model.as_deref())?;
    let agent = state
        .factory
        .create(kind, task, request.temperature, request.max_tokens);
    let reader = agent.channel().reader();
    let agent = state.registry.spawn(agent);

    let preview: String = task.chars().take(100).collect();
    tracing::info!(agent_id = %agent.id(), kind = %kind, task = %preview, "Agent created");
    Ok(sse_response(&agent, reader))
}

// POST /agents/{id}/provide_clarification
pub async fn provide_clarification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    if !request.stream {
        return Err(ApiError::streaming_required());
    }
    let agent = state.registry.get(&id)?;
    clarify(agent, &request)
}

fn clarify(
    agent: Arc<ResearchAgent>,
    request: &ChatCompletionRequest,
) -> Result<Response, ApiError> {
    let content = request.last_user_content()?;
    // Attach before resuming so no event of the continuation is missed.
    let reader = agent.channel().reader_from_end();
    agent.provide_clarification(content)?;
    Ok(sse_response(&agent, reader))
}

fn sse_response(agent: &ResearchAgent, reader: ChannelReader) -> Response {
    let encoder = ChunkEncoder::new(agent.id(), agent.kind().model_name());
    let frames = reader
        .into_segment_stream()
        .map(move |event| encoder.encode(&event).to_string())
        .chain(stream::once(async { "[DONE]".to_string() }))
        .map(|data| Ok::<_, Infallible>(Event::default().data(data)));

    let mut response = Sse::new(frames)
        .keep_alive(KeepAlive::default())
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(id) = HeaderValue::from_str(agent.id()) {
        headers.insert(HeaderName::from_static(AGENT_ID_HEADER), id);
    }
    headers.insert(
        HeaderName::from_static(AGENT_MODEL_HEADER),
        HeaderValue::from_static(agent.kind().model_name()),
    );
    response
}

/// Maps channel events onto `chat.completion.chunk` frames
struct ChunkEncoder {
    id: String,
    model: &'static str,
    created: i64,
}

impl ChunkEncoder {
    fn new(agent_id: &str, model: &'static str) -> Self {
        Self {
            id: agent_id.to_string(),
            model,
            created: chrono::Utc::now().timestamp(),
        }
    }

    fn encode(&self, event: &StreamEvent) -> Value {
        let (delta, finish_reason) = match event {
            StreamEvent::TextDelta { content } => (json!({"content": content}), None),
            StreamEvent::ToolCall {
                id,
                name,
                arguments,
            } => (
                json!({
                    "tool_calls": [{
                        "index": 0,
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": arguments}
                    }]
                }),
                None,
            ),
            StreamEvent::ToolResult { id, result, .. } => (
                json!({"role": "tool", "tool_call_id": id, "content": result}),
                None,
            ),
            StreamEvent::Suspended | StreamEvent::Finish => (json!({}), Some("stop")),
        };

        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        })
    }
}
