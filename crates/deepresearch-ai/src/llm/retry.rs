use std::time::Duration;

use reqwest::Response;

use crate::error::AiError;

/// Transport-level retry policy for LLM requests
#[derive(Debug, Clone)]
pub struct LlmRetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for LlmRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl LlmRetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after_secs {
            return Duration::from_secs(seconds).min(Duration::from_millis(self.max_delay_ms));
        }

        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

pub fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub async fn response_to_error(response: Response, provider: &str) -> AiError {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(&response);
    let body = response.text().await.unwrap_or_default();

    const MAX_ERROR_BODY: usize = 512;
    let message = if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}... [truncated]", &body[..cut])
    } else {
        body
    };

    AiError::LlmHttp {
        provider: provider.to_string(),
        status,
        message,
        retry_after_secs: retry_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_progression() {
        let config = LlmRetryConfig::default();
        assert_eq!(config.delay_for(1, None), Duration::from_millis(500));
        assert_eq!(config.delay_for(2, None), Duration::from_millis(1000));
        assert_eq!(config.delay_for(3, None), Duration::from_millis(2000));
        assert_eq!(config.delay_for(4, None), Duration::from_millis(4000));
        assert_eq!(config.delay_for(5, None), Duration::from_millis(8000));
        assert_eq!(config.delay_for(6, None), Duration::from_millis(8000));
    }

    #[test]
    fn test_retry_after_overrides_backoff_up_to_cap() {
        let config = LlmRetryConfig::default();
        assert_eq!(config.delay_for(3, Some(2)), Duration::from_secs(2));
        assert_eq!(config.delay_for(1, Some(600)), Duration::from_millis(8000));
    }

    #[test]
    fn test_disabled_has_no_retries() {
        assert_eq!(LlmRetryConfig::disabled().max_retries, 0);
    }
}
