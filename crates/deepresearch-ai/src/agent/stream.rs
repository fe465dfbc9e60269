//! Streaming output channel between an agent run and its consumers.
//!
//! The channel is an append-only event log. Every reader keeps its own
//! cursor, so consumers attached at different times see the same events at
//! their own pace. Nothing is dropped; the log lives as long as the agent.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;

use crate::llm::{ToolCall, ToolCallDelta};

/// One entry of the output log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolResult {
        id: String,
        name: String,
        result: String,
    },
    /// The agent is waiting for a clarification; the current segment ends here.
    Suspended,
    /// No further events will be appended.
    Finish,
}

impl StreamEvent {
    /// Whether a segment reader should stop after this event.
    pub fn ends_segment(&self) -> bool {
        matches!(self, Self::Suspended | Self::Finish)
    }
}

#[derive(Default)]
struct ChannelInner {
    events: Mutex<Vec<StreamEvent>>,
    notify: Notify,
}

/// Append-only, multi-reader event log for one agent
#[derive(Clone, Default)]
pub struct OutputChannel {
    inner: Arc<ChannelInner>,
}

impl OutputChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Ignored once the channel is finished.
    pub fn push(&self, event: StreamEvent) {
        {
            let mut events = self.inner.events.lock();
            if matches!(events.last(), Some(StreamEvent::Finish)) {
                tracing::debug!(?event, "Dropping event pushed after finish");
                return;
            }
            events.push(event);
        }
        self.inner.notify.notify_waiters();
    }

    pub fn finish(&self) {
        self.push(StreamEvent::Finish);
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.inner.events.lock().last(), Some(StreamEvent::Finish))
    }

    pub fn len(&self) -> usize {
        self.inner.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything appended so far
    pub fn snapshot(&self) -> Vec<StreamEvent> {
        self.inner.events.lock().clone()
    }

    /// Reader positioned at the first event.
    pub fn reader(&self) -> ChannelReader {
        ChannelReader {
            inner: Arc::clone(&self.inner),
            cursor: 0,
        }
    }

    /// Reader that only sees events appended from now on.
    pub fn reader_from_end(&self) -> ChannelReader {
        ChannelReader {
            inner: Arc::clone(&self.inner),
            cursor: self.len(),
        }
    }
}

/// Independent cursor over an [`OutputChannel`]
pub struct ChannelReader {
    inner: Arc<ChannelInner>,
    cursor: usize,
}

impl ChannelReader {
    /// Next event, waiting for the producer if the reader is caught up.
    /// Returns `None` after the finish event has been read.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let events = self.inner.events.lock();
                if let Some(event) = events.get(self.cursor) {
                    self.cursor += 1;
                    return Some(event.clone());
                }
                if matches!(events.last(), Some(StreamEvent::Finish)) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Events up to and including the next suspension or finish.
    pub fn into_segment_stream(mut self) -> impl Stream<Item = StreamEvent> + Send {
        async_stream::stream! {
            while let Some(event) = self.next().await {
                let last = event.ends_segment();
                yield event;
                if last {
                    break;
                }
            }
        }
    }
}

/// Sink for incremental agent output
#[async_trait]
pub trait StreamEmitter: Send + Sync {
    async fn emit_text_delta(&mut self, text: &str);
    async fn emit_tool_call(&mut self, id: &str, name: &str, arguments: &str);
    async fn emit_tool_result(&mut self, id: &str, name: &str, result: &str);
    async fn emit_complete(&mut self);
}

pub struct NullEmitter;

#[async_trait]
impl StreamEmitter for NullEmitter {
    async fn emit_text_delta(&mut self, _text: &str) {}
    async fn emit_tool_call(&mut self, _id: &str, _name: &str, _arguments: &str) {}
    async fn emit_tool_result(&mut self, _id: &str, _name: &str, _result: &str) {}
    async fn emit_complete(&mut self) {}
}

#[async_trait]
impl StreamEmitter for OutputChannel {
    async fn emit_text_delta(&mut self, text: &str) {
        self.push(StreamEvent::TextDelta {
            content: text.to_string(),
        });
    }

    async fn emit_tool_call(&mut self, id: &str, name: &str, arguments: &str) {
        self.push(StreamEvent::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        });
    }

    async fn emit_tool_result(&mut self, id: &str, name: &str, result: &str) {
        self.push(StreamEvent::ToolResult {
            id: id.to_string(),
            name: name.to_string(),
            result: result.to_string(),
        });
    }

    async fn emit_complete(&mut self) {
        self.finish();
    }
}

#[derive(Debug, Clone, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments_json: String,
}

/// Reassembles streamed tool-call fragments by index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    builders: BTreeMap<usize, ToolCallBuilder>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, delta: &ToolCallDelta) {
        let builder = self.builders.entry(delta.index).or_default();

        if let Some(id) = &delta.id
            && builder.id.is_empty()
        {
            builder.id = id.clone();
        }

        if let Some(name) = &delta.name
            && builder.name.is_empty()
        {
            builder.name = name.clone();
        }

        if let Some(args) = &delta.arguments {
            builder.arguments_json.push_str(args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn finalize(self) -> Vec<ToolCall> {
        self.builders
            .into_values()
            .map(|builder| ToolCall {
                id: builder.id,
                name: builder.name,
                arguments: parse_arguments(&builder.arguments_json),
            })
            .collect()
    }
}

fn parse_arguments(json: &str) -> Value {
    if json.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                json_len = json.len(),
                error = %e,
                "Failed to parse streamed tool call arguments"
            );
            Value::String(json.to_string())
        }
    }
}
