//! DeepResearch AI - schema-guided research agent
//!
//! This crate provides:
//! - Research loop with clarification, planning, search and report tools
//! - Per-iteration tool-set compiler driven by session budgets
//! - Structured-output providers with staged schema fallback
//! - OpenAI-compatible LLM client (OpenAI, Mistral) and Tavily search
//! - Append-only output channel for streaming agent events

pub mod agent;
pub mod error;
mod http_client;
pub mod llm;
pub mod schema;
pub mod structured;
pub mod tools;

// Re-export commonly used types
pub use agent::{
    AgentConfig, AgentKind, AgentStatus, Budgets, OutputChannel, PromptLoader, ResearchAgent,
    ResearchContext, Source, StreamEvent, ToolSet,
};
pub use error::{AiError, Result};
pub use llm::{
    LlmClient, LlmProvider, LlmRetryConfig, LlmSettings, Message, MockLlmClient, MockStep,
    OpenAIClient, Role, create_client,
};
pub use schema::{CompiledSchema, FieldSchema, RecordSchema, SchemaCompiler, SchemaType};
pub use structured::{
    CompiledProvider, NativeProvider, OutputSchema, SoMode, StructuredProvider,
    StructuredStrategy, create_provider,
};
pub use tools::{
    FileReportStore, ReportStore, ResearchTool, SearchProvider, SearchResponse, TavilySearch,
    ToolEnv, ToolKind,
};
