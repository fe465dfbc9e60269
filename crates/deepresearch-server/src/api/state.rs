use std::sync::Arc;

use anyhow::Context;
use deepresearch_ai::{
    AgentConfig, AgentKind, FileReportStore, PromptLoader, ResearchAgent, StructuredProvider,
    TavilySearch, ToolEnv, create_client, create_provider,
};

use crate::config::AppConfig;
use crate::registry::AgentRegistry;

/// Builds agents that share one provider, tool environment and prompt
pub struct AgentFactory {
    provider: Arc<dyn StructuredProvider>,
    env: ToolEnv,
    prompts: PromptLoader,
    config: AgentConfig,
}

impl AgentFactory {
    pub fn new(
        provider: Arc<dyn StructuredProvider>,
        env: ToolEnv,
        prompts: PromptLoader,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            env,
            prompts,
            config,
        }
    }

    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = create_client(&config.llm_settings())?;
        let provider = create_provider(
            config.llm.strategy(),
            client,
            config.llm.so_mode,
            config.llm.strict,
            config.llm.allow_additional_properties,
        );

        let search_key = config
            .search
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context("Tavily API key is required (set TAVILY_API_KEY or [search].api_key)")?;
        let search = TavilySearch::new(search_key)
            .with_base_url(&config.search.base_url)
            .with_max_results(config.search.max_results);
        let reports = FileReportStore::new(&config.execution.reports_dir);
        let env = ToolEnv::new(Arc::new(search), Arc::new(reports))
            .with_content_limit(config.search.content_limit);

        let prompts = PromptLoader::load(
            config.prompts.prompts_dir.as_deref(),
            &config.prompts.system_prompt_file,
        )
        .await?;

        tracing::info!(
            provider = config.llm.provider.as_str(),
            model = config.llm.model(),
            strategy = ?config.llm.strategy(),
            so_mode = ?config.llm.so_mode,
            "Agent factory ready"
        );
        Ok(Self::new(provider, env, prompts, config.agent_config()))
    }

    /// New agent for `task`; request sampling values override the configured ones.
    pub fn create(
        &self,
        kind: AgentKind,
        task: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> ResearchAgent {
        let config = self.config.clone().with_sampling(
            temperature.or(self.config.temperature),
            max_tokens.or(self.config.max_tokens),
        );
        ResearchAgent::new(
            kind,
            task,
            Arc::clone(&self.provider),
            self.env.clone(),
            self.prompts.clone(),
            config,
        )
    }
}

/// Shared by every handler
pub struct AppContext {
    pub registry: AgentRegistry,
    pub factory: AgentFactory,
}

impl AppContext {
    pub fn new(registry: AgentRegistry, factory: AgentFactory) -> Self {
        Self { registry, factory }
    }
}

pub type AppState = Arc<AppContext>;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use deepresearch_ai::agent::FoundSource;
    use deepresearch_ai::{
        MockLlmClient, MockStep, NativeProvider, Result, SearchProvider, SearchResponse,
    };
    use std::path::Path;

    struct StaticSearch;

    #[async_trait]
    impl SearchProvider for StaticSearch {
        async fn search(&self, query: &str, _max: usize, _raw: bool) -> Result<SearchResponse> {
            Ok(SearchResponse {
                answer: None,
                sources: vec![FoundSource {
                    title: format!("About {query}"),
                    url: format!("https://example.com/{}", query.len()),
                    snippet: "snippet".to_string(),
                    full_content: None,
                }],
            })
        }
    }

    /// State whose agents replay `steps` against a scripted model.
    pub fn state(steps: Vec<MockStep>, reports_dir: &Path) -> AppState {
        let client = MockLlmClient::from_steps("mock", steps);
        let env = ToolEnv::new(
            Arc::new(StaticSearch),
            Arc::new(FileReportStore::new(reports_dir)),
        );
        let factory = AgentFactory::new(
            Arc::new(NativeProvider::new(Arc::new(client))),
            env,
            PromptLoader::builtin(),
            AgentConfig::default(),
        );
        Arc::new(AppContext::new(AgentRegistry::new(), factory))
    }
}
