use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use deepresearch_ai::agent::{DEFAULT_CLARIFICATION_TIMEOUT, DEFAULT_SYSTEM_PROMPT_FILE};
use deepresearch_ai::tools::{DEFAULT_CONTENT_LIMIT, DEFAULT_MAX_RESULTS, TAVILY_BASE_URL};
use deepresearch_ai::{
    AgentConfig, Budgets, LlmProvider, LlmRetryConfig, LlmSettings, SoMode, StructuredStrategy,
};
use serde::Deserialize;

use crate::registry::DEFAULT_AGENT_RETENTION;

const DEFAULT_CONFIG_FILE: &str = "deepresearch.toml";

/// Server configuration, read from TOML with environment overrides for secrets
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Falls back to the provider's default model
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    /// Falls back to the provider's default strategy
    #[serde(default)]
    pub strategy: Option<StructuredStrategy>,
    #[serde(default)]
    pub so_mode: SoMode,
    #[serde(default = "default_true")]
    pub strict: bool,
    #[serde(default)]
    pub allow_additional_properties: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            strategy: None,
            so_mode: SoMode::default(),
            strict: true,
            allow_additional_properties: false,
            max_retries: default_max_retries(),
        }
    }
}

impl LlmSection {
    pub fn model(&self) -> &str {
        match &self.model {
            Some(model) if !model.trim().is_empty() => model,
            _ => match self.provider {
                LlmProvider::OpenAI => "gpt-4o-mini",
                LlmProvider::Mistral => "mistral-large-latest",
            },
        }
    }

    pub fn strategy(&self) -> StructuredStrategy {
        self.strategy
            .unwrap_or_else(|| self.provider.default_strategy())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Characters of scraped page content kept per source
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_base_url(),
            max_results: default_max_results(),
            content_limit: default_content_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_clarifications")]
    pub max_clarifications: usize,
    #[serde(default = "default_max_searches")]
    pub max_searches: usize,
    #[serde(default = "default_clarification_timeout_secs")]
    pub clarification_timeout_secs: u64,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: Option<PathBuf>,
    /// Seconds a finished agent stays in the registry
    #[serde(default = "default_agent_retention_secs")]
    pub agent_retention_secs: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_clarifications: default_max_clarifications(),
            max_searches: default_max_searches(),
            clarification_timeout_secs: default_clarification_timeout_secs(),
            reports_dir: default_reports_dir(),
            logs_dir: default_logs_dir(),
            agent_retention_secs: default_agent_retention_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptsSection {
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: Option<PathBuf>,
    #[serde(default = "default_system_prompt_file")]
    pub system_prompt_file: String,
}

impl Default for PromptsSection {
    fn default() -> Self {
        Self {
            prompts_dir: default_prompts_dir(),
            system_prompt_file: default_system_prompt_file(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8010
}

fn default_max_tokens() -> Option<u32> {
    Some(8000)
}

fn default_temperature() -> Option<f32> {
    Some(0.4)
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    LlmRetryConfig::default().max_retries
}

fn default_search_base_url() -> String {
    TAVILY_BASE_URL.to_string()
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_content_limit() -> usize {
    DEFAULT_CONTENT_LIMIT
}

fn default_max_iterations() -> usize {
    Budgets::default().max_iterations
}

fn default_max_clarifications() -> usize {
    Budgets::default().max_clarifications
}

fn default_max_searches() -> usize {
    Budgets::default().max_searches
}

fn default_clarification_timeout_secs() -> u64 {
    DEFAULT_CLARIFICATION_TIMEOUT.as_secs()
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_logs_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_agent_retention_secs() -> u64 {
    DEFAULT_AGENT_RETENTION.as_secs()
}

fn default_prompts_dir() -> Option<PathBuf> {
    Some(PathBuf::from("prompts"))
}

fn default_system_prompt_file() -> String {
    DEFAULT_SYSTEM_PROMPT_FILE.to_string()
}

impl AppConfig {
    /// Read `path`, or `./deepresearch.toml` when present, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path.display(), err))?;
        Self::parse(&contents)
            .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), err))
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// API keys from the environment win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty(self.llm.provider.api_key_env()) {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = non_empty("TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }
    }

    pub fn llm_settings(&self) -> LlmSettings {
        let mut settings = LlmSettings::new(self.llm.provider, self.llm.model());
        settings.api_key = self.llm.api_key.clone();
        settings.base_url = self.llm.base_url.clone();
        settings.retry = LlmRetryConfig {
            max_retries: self.llm.max_retries,
            ..LlmRetryConfig::default()
        };
        settings
    }

    pub fn budgets(&self) -> Budgets {
        Budgets {
            max_iterations: self.execution.max_iterations,
            max_clarifications: self.execution.max_clarifications,
            max_searches: self.execution.max_searches,
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::default()
            .with_budgets(self.budgets())
            .with_clarification_timeout(Duration::from_secs(
                self.execution.clarification_timeout_secs,
            ))
            .with_sampling(self.llm.temperature, self.llm.max_tokens);
        if let Some(dir) = &self.execution.logs_dir {
            config = config.with_logs_dir(dir);
        }
        config
    }

    pub fn agent_retention(&self) -> Duration {
        Duration::from_secs(self.execution.agent_retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8010);
        assert_eq!(config.llm.model(), "gpt-4o-mini");
        assert_eq!(config.llm.strategy(), StructuredStrategy::Native);
        assert_eq!(config.budgets(), Budgets::default());
        assert_eq!(config.agent_retention(), DEFAULT_AGENT_RETENTION);
        assert_eq!(
            config.agent_config().clarification_timeout,
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn test_partial_file_keeps_section_defaults() {
        let config = AppConfig::parse(
            r#"
            [llm]
            provider = "mistral"
            so_mode = "json_mode"

            [execution]
            max_iterations = 3
            logs_dir = "/tmp/agent-logs"
            agent_retention_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Mistral);
        assert_eq!(config.llm.model(), "mistral-large-latest");
        assert_eq!(config.llm.strategy(), StructuredStrategy::Compiled);
        assert_eq!(config.llm.so_mode, SoMode::JsonMode);
        assert!(config.llm.strict);
        assert_eq!(config.execution.max_iterations, 3);
        assert_eq!(config.execution.max_searches, Budgets::default().max_searches);
        assert_eq!(config.agent_retention(), Duration::from_secs(120));
        assert_eq!(
            config.agent_config().logs_dir,
            Some(PathBuf::from("/tmp/agent-logs"))
        );
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(AppConfig::parse("[llm]\nprovider = \"acme\"").is_err());
    }

    #[test]
    fn test_env_overrides_api_keys_for_selected_provider() {
        let mut config = AppConfig::parse(
            r#"
            [llm]
            provider = "mistral"
            api_key = "from-file"

            [search]
            api_key = "tavily-file"
            "#,
        )
        .unwrap();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "openai-env"),
            ("MISTRAL_API_KEY", "mistral-env"),
            ("TAVILY_API_KEY", ""),
        ]);
        config.apply_env(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("mistral-env"));
        assert_eq!(config.search.api_key.as_deref(), Some("tavily-file"));
        assert_eq!(config.llm_settings().api_key.as_deref(), Some("mistral-env"));
    }

    #[test]
    fn test_load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9000);

        let missing = AppConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(missing.unwrap_err().to_string().contains("Failed to read config"));
    }
}
