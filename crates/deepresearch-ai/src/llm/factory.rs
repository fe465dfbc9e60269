//! LLM client construction from provider settings

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};
use crate::llm::retry::LlmRetryConfig;
use crate::llm::{LlmClient, OpenAIClient};
use crate::structured::StructuredStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAI,
    Mistral,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Mistral => "mistral",
        }
    }

    /// Environment variable holding this provider's API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
        }
    }

    /// OpenAI decodes strict JSON Schema natively; Mistral goes through the compiler.
    pub fn default_strategy(&self) -> StructuredStrategy {
        match self {
            Self::OpenAI => StructuredStrategy::Native,
            Self::Mistral => StructuredStrategy::Compiled,
        }
    }
}

/// Connection settings for one chat model
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub retry: LlmRetryConfig,
}

impl LlmSettings {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            base_url: None,
            retry: LlmRetryConfig::default(),
        }
    }
}

/// Build a client for the configured provider.
pub fn create_client(settings: &LlmSettings) -> Result<Arc<dyn LlmClient>> {
    let key = settings
        .api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            AiError::Llm(format!(
                "{} API key is required (set {})",
                settings.provider.as_str(),
                settings.provider.api_key_env()
            ))
        })?;

    let mut client = match settings.provider {
        LlmProvider::OpenAI => OpenAIClient::new(key),
        LlmProvider::Mistral => OpenAIClient::mistral(key),
    }
    .with_model(settings.model.trim())
    .with_retry_config(settings.retry.clone());

    if let Some(base_url) = &settings.base_url {
        client = client.with_base_url(base_url);
    }

    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_rejected() {
        let settings = LlmSettings::new(LlmProvider::Mistral, "mistral-large-latest");
        let err = create_client(&settings).err().expect("missing key");
        assert!(err.to_string().contains("MISTRAL_API_KEY"));
    }

    #[test]
    fn test_create_client_uses_provider_label() {
        let mut settings = LlmSettings::new(LlmProvider::Mistral, "mistral-small");
        settings.api_key = Some("key".to_string());
        let client = create_client(&settings).expect("client");
        assert_eq!(client.provider(), "mistral");
        assert_eq!(client.model(), "mistral-small");
    }

    #[test]
    fn test_provider_serde_names() {
        let provider: LlmProvider = serde_json::from_str("\"mistral\"").unwrap();
        assert_eq!(provider, LlmProvider::Mistral);
        assert_eq!(provider.default_strategy(), StructuredStrategy::Compiled);
        assert_eq!(
            LlmProvider::OpenAI.default_strategy(),
            StructuredStrategy::Native
        );
    }
}
