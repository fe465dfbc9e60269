//! Web search tool
//!
//! Runs a query through the configured [`SearchProvider`](crate::tools::SearchProvider),
//! registers the hits as numbered sources and returns a citation-ready digest.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::context::{SearchResult, SharedContext, Source};
use crate::error::Result;
use crate::schema::{FieldSchema, RecordSchema, SchemaType};
use crate::tools::registry::ToolKind;
use crate::tools::traits::{ToolArgs, ToolEnv};

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchArgs {
    pub reasoning: String,
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub plan_adapted: bool,
    #[serde(default)]
    pub scrape_content: bool,
}

#[async_trait]
impl ToolArgs for WebSearchArgs {
    const KIND: ToolKind = ToolKind::WebSearch;

    fn description() -> &'static str {
        "Gather information.\n\
         - Use SPECIFIC terms and context in search queries\n\
         - For acronyms, add context: \"SGR Schema-Guided Reasoning\"\n\
         - Use quotes for exact phrases\n\
         - Write search queries in the SAME LANGUAGE as the user request\n\
         - Set scrape_content=true for deeper analysis (fetches full page content)"
    }

    fn schema() -> RecordSchema {
        RecordSchema::new("WebSearchTool", Self::description())
            .field(FieldSchema::new(
                "reasoning",
                "Why this search is needed and what to expect",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "query",
                "Search query in the same language as the user request",
                SchemaType::String,
            ))
            .field(
                FieldSchema::new("max_results", "Maximum results", SchemaType::integer(1, 10))
                    .with_default(json!(default_max_results())),
            )
            .field(
                FieldSchema::new(
                    "plan_adapted",
                    "Is this search after adapting the plan?",
                    SchemaType::Boolean,
                )
                .with_default(json!(false)),
            )
            .field(
                FieldSchema::new(
                    "scrape_content",
                    "Fetch full page content for deeper analysis",
                    SchemaType::Boolean,
                )
                .with_default(json!(false)),
            )
    }

    async fn execute(&self, ctx: &SharedContext, env: &ToolEnv) -> Result<String> {
        tracing::info!(query = %self.query, max_results = self.max_results, "Web search");

        let response = env
            .search
            .search(&self.query, self.max_results, self.scrape_content)
            .await?;

        let citations = {
            let mut ctx = ctx.lock();
            let citations = ctx.register_sources(response.sources);
            ctx.searches.push(SearchResult {
                query: self.query.clone(),
                answer: response.answer.clone(),
                citations: citations.clone(),
                timestamp: Utc::now(),
            });
            ctx.searches_used += 1;
            citations
        };

        let formatted = format_results(
            &self.query,
            response.answer.as_deref(),
            &citations,
            env.content_limit,
        );
        tracing::debug!(result = %formatted, "Web search result");
        Ok(formatted)
    }
}

fn format_results(
    query: &str,
    answer: Option<&str>,
    citations: &[Source],
    content_limit: usize,
) -> String {
    let mut out = format!("Search Query: {query}\n\n");
    if let Some(answer) = answer {
        out.push_str(&format!("AI Answer: {answer}\n\n"));
    }
    out.push_str("Search Results:\n\n");

    for source in citations {
        match &source.full_content {
            Some(content) => {
                let excerpt: String = content.chars().take(content_limit).collect();
                out.push_str(&format!(
                    "{source}\n\n**Full Content (Markdown):**\n{excerpt}\n\n"
                ));
            }
            None => out.push_str(&format!("{source}\n{}\n\n", source.snippet)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(number: usize, full: Option<&str>) -> Source {
        Source {
            number,
            title: format!("T{number}"),
            url: format!("https://s{number}.dev"),
            snippet: format!("snippet {number}"),
            full_content: full.map(str::to_string),
            char_count: full.map_or(0, str::len),
        }
    }

    #[test]
    fn test_format_results_layout() {
        let text = format_results(
            "rust",
            Some("A language"),
            &[source(1, None), source(2, Some("abcdef"))],
            3,
        );
        assert_eq!(
            text,
            "Search Query: rust\n\n\
             AI Answer: A language\n\n\
             Search Results:\n\n\
             [1] T1 - https://s1.dev\nsnippet 1\n\n\
             [2] T2 - https://s2.dev\n\n**Full Content (Markdown):**\nabc\n\n"
        );
    }

    #[test]
    fn test_defaults_apply_when_fields_missing() {
        let args: WebSearchArgs =
            serde_json::from_value(json!({"reasoning": "r", "query": "q"})).unwrap();
        assert_eq!(args.max_results, 10);
        assert!(!args.plan_adapted);
        assert!(!args.scrape_content);
    }
}
