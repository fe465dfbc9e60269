//! Agent module - schema-guided research loop
//!
//! ## Iteration
//!
//! 1. Tool set - permitted tools computed from the session budgets
//! 2. Reason - the model assesses the situation and picks one tool
//! 3. Act - the tool runs against the research context
//! 4. Observe - the result is appended to the conversation and streamed
//! 5. Repeat until a terminal state; a clarification pauses the loop
//!
//! ## Variants
//!
//! | Model name | Reasoning | Action |
//! |------------|-----------|--------|
//! | `sgr-agent` | structured decision | inside the decision |
//! | `sgr-tools-agent` | forced `reasoning` call | `tool_choice = required` |
//! | `sgr-auto-tools-agent` | forced `reasoning` call | `tool_choice = auto` |

pub mod context;
mod executor;
pub mod prompts;
pub mod state;
pub mod stream;
pub mod toolset;

pub use context::{
    ClarificationSignal, FoundSource, ResearchContext, SearchResult, SharedContext, Source,
};
pub use executor::{
    AgentConfig, AgentKind, DEFAULT_CLARIFICATION_TIMEOUT, ResearchAgent,
};
pub use prompts::{DEFAULT_SYSTEM_PROMPT_FILE, PromptLoader, render_placeholders};
pub use state::{AgentLog, AgentStatus, LogStep};
pub use stream::{
    ChannelReader, NullEmitter, OutputChannel, StreamEmitter, StreamEvent, ToolCallAccumulator,
};
pub use toolset::{Budgets, NEXT_STEP_SCHEMA_NAME, NextStep, ToolSet};
