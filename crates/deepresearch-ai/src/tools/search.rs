//! Search backends used by the web search tool

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::agent::context::FoundSource;
use crate::error::{AiError, Result};
use crate::http_client::build_http_client;

pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Hits and optional synthesized answer for one query
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub answer: Option<String>,
    pub sources: Vec<FoundSource>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        include_raw_content: bool,
    ) -> Result<SearchResponse>;
}

/// Tavily search API client
pub struct TavilySearch {
    client: Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            api_key: api_key.into(),
            base_url: TAVILY_BASE_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Upper bound applied to every request, whatever the tool asks for.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        include_raw_content: bool,
    ) -> Result<SearchResponse> {
        let max_results = max_results.clamp(1, self.max_results);
        tracing::info!(query, max_results, "Tavily search");

        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "include_raw_content": include_raw_content,
        });
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Search(format!(
                "Tavily Search API error ({}): {}",
                status, body
            )));
        }

        let data: TavilyResponse = response.json().await?;
        let sources = data
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(max_results)
            .map(|r| FoundSource {
                title: r.title.unwrap_or_default(),
                url: r.url,
                snippet: r.content.unwrap_or_default(),
                full_content: r.raw_content.filter(|c| !c.is_empty()),
            })
            .collect();

        Ok(SearchResponse {
            answer: data.answer.filter(|a| !a.is_empty()),
            sources,
        })
    }
}
