//! Error types for the research agent

use thiserror::Error;

/// Research agent error types
#[derive(Error, Debug)]
pub enum AiError {
    /// Decoding or validation failed after every structured-output stage.
    #[error("Structured output error: {0}")]
    StructuredOutput(String),

    /// A schema uses a construct the compiler refuses to flatten.
    #[error("Schema too complex: {0}")]
    SchemaTooComplex(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not permitted: {0}")]
    ToolNotPermitted(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM HTTP error ({provider}, status {status}): {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Search error: {0}")]
    Search(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Clarification not received within {0} seconds")]
    ClarificationTimeout(u64),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    /// Whether a transport-level retry could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LlmHttp { status, .. } => *status == 429 || *status >= 500,
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Llm(message) => {
                let lower = message.to_lowercase();
                lower.contains("rate limit")
                    || lower.contains("timeout")
                    || lower.contains("timed out")
                    || lower.contains("overloaded")
            }
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::LlmHttp {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// Decoding or validation failures that a later structured-output stage
    /// may recover from. Transport errors are not among them.
    pub fn is_structured_failure(&self) -> bool {
        matches!(
            self,
            Self::StructuredOutput(_)
                | Self::SchemaTooComplex(_)
                | Self::InvalidFormat(_)
                | Self::Json(_)
        )
    }

    /// Errors caused by the caller rather than by the agent run.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::AgentNotFound(_))
    }
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_http_retryable_statuses() {
        let rate_limited = AiError::LlmHttp {
            provider: "openai".to_string(),
            status: 429,
            message: "slow down".to_string(),
            retry_after_secs: Some(3),
        };
        let unauthorized = AiError::LlmHttp {
            provider: "openai".to_string(),
            status: 401,
            message: "bad key".to_string(),
            retry_after_secs: None,
        };
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_after(), Some(3));
        assert!(!unauthorized.is_retryable());
    }

    #[test]
    fn test_structured_errors_are_not_retryable() {
        assert!(!AiError::StructuredOutput("bad".to_string()).is_retryable());
        assert!(!AiError::SchemaTooComplex("map".to_string()).is_retryable());
    }

    #[test]
    fn test_structured_failures_exclude_transport() {
        assert!(AiError::InvalidFormat("no object".to_string()).is_structured_failure());
        assert!(AiError::SchemaTooComplex("map".to_string()).is_structured_failure());
        assert!(!AiError::Llm("HTTP 401 unauthorized".to_string()).is_structured_failure());
        let unauthorized = AiError::LlmHttp {
            provider: "openai".to_string(),
            status: 401,
            message: "bad key".to_string(),
            retry_after_secs: None,
        };
        assert!(!unauthorized.is_structured_failure());
    }

    #[test]
    fn test_client_errors() {
        assert!(AiError::InvalidRequest("not waiting".to_string()).is_client_error());
        assert!(AiError::AgentNotFound("x".to_string()).is_client_error());
        assert!(!AiError::Tool("boom".to_string()).is_client_error());
    }
}
