//! Final report tool and the storage it writes to

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::agent::context::{SharedContext, Source};
use crate::error::Result;
use crate::schema::{FieldSchema, RecordSchema, SchemaType};
use crate::tools::registry::ToolKind;
use crate::tools::traits::{ToolArgs, ToolEnv};

const MAX_TITLE_CHARS: usize = 50;

/// Persists finished reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Save a report and return where it was written.
    async fn save(&self, title: &str, content: &str, sources: &[Source]) -> Result<String>;
}

/// Writes markdown reports into a directory
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

/// Keep alphanumerics, spaces, dashes and underscores.
fn safe_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(MAX_TITLE_CHARS)
        .collect()
}

fn render_report(title: &str, content: &str, sources: &[Source]) -> String {
    let created = Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut out = format!("# {title}\n\n*Created: {created}*\n\n{content}\n\n");
    let listing: Vec<String> = sources.iter().map(|s| format!("- {s}")).collect();
    out.push_str(&listing.join("\n"));
    out
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn save(&self, title: &str, content: &str, sources: &[Source]) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = format!(
            "{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            safe_title(title)
        );

        // Same title within the same second gets a numeric suffix.
        let mut attempt = 1;
        let (path, mut file) = loop {
            let filename = match attempt {
                1 => format!("{stem}.md"),
                n => format!("{stem}_{n}.md"),
            };
            let path = self.dir.join(filename);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };

        file.write_all(render_report(title, content, sources).as_bytes())
            .await?;
        file.flush().await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReportArgs {
    pub reasoning: String,
    pub title: String,
    pub user_request_language_reference: String,
    pub content: String,
    pub confidence: Confidence,
}

#[async_trait]
impl ToolArgs for CreateReportArgs {
    const KIND: ToolKind = ToolKind::CreateReport;

    fn description() -> &'static str {
        "Create a comprehensive detailed report with citations as the final step of research."
    }

    fn schema() -> RecordSchema {
        RecordSchema::new("CreateReportTool", Self::description())
            .field(FieldSchema::new(
                "reasoning",
                "Why ready to create the report now",
                SchemaType::String,
            ))
            .field(FieldSchema::new("title", "Report title", SchemaType::String))
            .field(FieldSchema::new(
                "user_request_language_reference",
                "Copy of the original user request to ensure language consistency",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "content",
                "Comprehensive research report following the report guidelines, \
                 in the SAME LANGUAGE as user_request_language_reference, \
                 with inline citations [1], [2]",
                SchemaType::String,
            ))
            .field(FieldSchema::new(
                "confidence",
                "Confidence in findings",
                SchemaType::enumeration(["high", "medium", "low"]),
            ))
    }

    async fn execute(&self, ctx: &SharedContext, env: &ToolEnv) -> Result<String> {
        let sources = ctx.lock().sorted_sources();
        let filepath = env.reports.save(&self.title, &self.content, &sources).await?;
        let word_count = self.content.split_whitespace().count();

        tracing::info!(
            title = %self.title,
            language_reference = %self.user_request_language_reference,
            confidence = ?self.confidence,
            word_count,
            sources_count = sources.len(),
            filepath = %filepath,
            "Report created"
        );

        Ok(serde_json::to_string_pretty(&json!({
            "title": self.title,
            "content": self.content,
            "confidence": self.confidence,
            "sources_count": sources.len(),
            "word_count": word_count,
            "filepath": filepath,
            "timestamp": Utc::now().to_rfc3339(),
        }))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn source(number: usize, url: &str) -> Source {
        Source {
            number,
            title: format!("Source {number}"),
            url: url.to_string(),
            snippet: String::new(),
            full_content: None,
            char_count: 0,
        }
    }

    #[test]
    fn test_safe_title_filters_and_truncates() {
        assert_eq!(safe_title("What's new: Rust/2024?"), "Whats new Rust2024");
        assert_eq!(safe_title(&"x".repeat(80)).len(), MAX_TITLE_CHARS);
    }

    #[tokio::test]
    async fn test_file_store_writes_markdown_with_sources() {
        let dir = tempdir().unwrap();
        let store = FileReportStore::new(dir.path().join("reports"));
        let path = store
            .save(
                "Rust async",
                "Body [1] and [2].",
                &[source(1, "https://a.dev"), source(2, "https://b.dev")],
            )
            .await
            .unwrap();

        assert!(path.ends_with("_Rust async.md"));
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.starts_with("# Rust async\n\n*Created: "));
        assert!(written.contains("Body [1] and [2].\n\n"));
        assert!(written.ends_with(
            "- [1] Source 1 - https://a.dev\n- [2] Source 2 - https://b.dev"
        ));
    }

    #[tokio::test]
    async fn test_repeated_titles_get_distinct_files() {
        let dir = tempdir().unwrap();
        let store = FileReportStore::new(dir.path());

        let mut paths = Vec::new();
        for body in ["first", "second", "third"] {
            paths.push(store.save("Rust async", body, &[]).await.unwrap());
        }

        let unique: std::collections::HashSet<&String> = paths.iter().collect();
        assert_eq!(unique.len(), 3);
        for (path, body) in paths.iter().zip(["first", "second", "third"]) {
            let written = tokio::fs::read_to_string(path).await.unwrap();
            assert!(written.contains(body));
        }
    }
}
