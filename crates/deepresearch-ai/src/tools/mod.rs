//! Research tools: argument records, executors and the registration table

mod clarification;
mod completion;
mod plan;
mod reasoning;
pub mod registry;
pub mod report;
pub mod search;
mod traits;
mod web_search;

pub use clarification::ClarificationArgs;
pub use completion::{AgentCompletionArgs, CompletionStatus};
pub use plan::{AdaptPlanArgs, GeneratePlanArgs};
pub use reasoning::ReasoningArgs;
pub use registry::{ResearchTool, ToolKind, ToolRegistration};
pub use report::{Confidence, CreateReportArgs, FileReportStore, ReportStore};
pub use search::{DEFAULT_MAX_RESULTS, SearchProvider, SearchResponse, TAVILY_BASE_URL, TavilySearch};
pub use traits::{DEFAULT_CONTENT_LIMIT, ToolArgs, ToolEnv, ToolSchema};
pub use web_search::WebSearchArgs;
