//! LLM module - OpenAI-compatible client abstraction

mod client;
pub mod factory;
mod mock_client;
mod openai;
pub mod retry;

pub use client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, ResponseFormat, Role,
    StreamChunk, StreamResult, TokenUsage, ToolCall, ToolCallDelta, ToolChoice,
};
pub use factory::{LlmProvider, LlmSettings, create_client};
pub use mock_client::{MockLlmClient, MockStep, MockStepKind};
pub use openai::{MISTRAL_BASE_URL, OPENAI_BASE_URL, OpenAIClient};
pub use retry::LlmRetryConfig;
