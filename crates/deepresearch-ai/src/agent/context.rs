//! Research context: budgets, sources and the clarification rendezvous

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::agent::state::AgentStatus;
use crate::error::{AiError, Result};
use crate::tools::ReasoningArgs;

/// One retrieved reference with its citation number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub number: usize,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub full_content: Option<String>,
    pub char_count: usize,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.title.is_empty() {
            "Untitled"
        } else {
            &self.title
        };
        write!(f, "[{}] {} - {}", self.number, title, self.url)
    }
}

/// A source as returned by the search backend, before numbering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoundSource {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub full_content: Option<String>,
}

/// One search invocation
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub answer: Option<String>,
    pub citations: Vec<Source>,
    pub timestamp: DateTime<Utc>,
}

/// Re-armable single-slot rendezvous for clarification answers
#[derive(Clone, Default)]
pub struct ClarificationSignal {
    inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
    received: Mutex<bool>,
    notify: Notify,
}

impl ClarificationSignal {
    /// Re-arm before a new wait.
    pub fn clear(&self) {
        *self.inner.received.lock() = false;
    }

    pub fn set(&self) {
        *self.inner.received.lock() = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        *self.inner.received.lock()
    }

    /// Wait until [`set`](Self::set) is called, failing after `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        let wait = async {
            loop {
                let notified = self.inner.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.is_set() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| AiError::ClarificationTimeout(timeout.as_secs()))
    }
}

impl fmt::Debug for ClarificationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClarificationSignal")
            .field("received", &self.is_set())
            .finish()
    }
}

/// Mutable state of one research session
#[derive(Debug, Default)]
pub struct ResearchContext {
    pub iteration: usize,
    pub searches_used: usize,
    pub clarifications_used: usize,
    pub state: AgentStatus,
    /// Keyed by URL
    pub sources: HashMap<String, Source>,
    pub searches: Vec<SearchResult>,
    pub current_reasoning: Option<ReasoningArgs>,
    pub clarification: ClarificationSignal,
}

pub type SharedContext = Arc<Mutex<ResearchContext>>;

impl ResearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    /// Register search hits, numbering unseen URLs after the highest
    /// existing citation. Known URLs keep their number.
    pub fn register_sources(&mut self, found: Vec<FoundSource>) -> Vec<Source> {
        let mut registered = Vec::with_capacity(found.len());
        for hit in found {
            if hit.url.is_empty() {
                continue;
            }
            if let Some(existing) = self.sources.get_mut(&hit.url) {
                if existing.full_content.is_none()
                    && let Some(content) = hit.full_content
                {
                    existing.char_count = content.chars().count();
                    existing.full_content = Some(content);
                }
                registered.push(existing.clone());
                continue;
            }

            let source = Source {
                number: self.sources.len() + 1,
                char_count: hit.full_content.as_ref().map_or(0, |c| c.chars().count()),
                title: hit.title,
                url: hit.url.clone(),
                snippet: hit.snippet,
                full_content: hit.full_content,
            };
            self.sources.insert(hit.url, source.clone());
            registered.push(source);
        }
        registered
    }

    /// Sources ordered by citation number
    pub fn sorted_sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.sources.values().cloned().collect();
        sources.sort_by_key(|s| s.number);
        sources
    }

    /// Public snapshot used by the state endpoint and the log dump.
    pub fn agent_state(&self) -> Value {
        json!({
            "iteration": self.iteration,
            "state": self.state,
            "searches_used": self.searches_used,
            "clarifications_used": self.clarifications_used,
            "sources_count": self.sources.len(),
            "current_state_reasoning": self.current_reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str) -> FoundSource {
        FoundSource {
            title: format!("Title {url}"),
            url: url.to_string(),
            snippet: "snippet".to_string(),
            full_content: None,
        }
    }

    #[test]
    fn test_numbering_is_sequential_across_searches() {
        let mut ctx = ResearchContext::new();
        let first = ctx.register_sources(vec![hit("a"), hit("b")]);
        let second = ctx.register_sources(vec![hit("c"), hit("d"), hit("e")]);

        assert_eq!(first.iter().map(|s| s.number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            second.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
    }

    #[test]
    fn test_known_url_keeps_its_number() {
        let mut ctx = ResearchContext::new();
        ctx.register_sources(vec![hit("a"), hit("b")]);
        let mut again = hit("a");
        again.full_content = Some("full text".to_string());
        let registered = ctx.register_sources(vec![again, hit("c"), hit("")]);

        assert_eq!(
            registered.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(ctx.sources["a"].char_count, 9);
        assert_eq!(ctx.sources.len(), 3);
    }

    #[test]
    fn test_source_display() {
        let source = Source {
            number: 4,
            title: String::new(),
            url: "https://example.com".to_string(),
            snippet: String::new(),
            full_content: None,
            char_count: 0,
        };
        assert_eq!(source.to_string(), "[4] Untitled - https://example.com");
    }

    #[tokio::test]
    async fn test_clarification_signal_rendezvous() {
        let signal = ClarificationSignal::default();
        signal.clear();

        let setter = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            setter.set();
        });

        signal.wait(Duration::from_secs(1)).await.unwrap();
        assert!(signal.is_set());

        signal.clear();
        assert!(!signal.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clarification_signal_times_out() {
        let signal = ClarificationSignal::default();
        let err = signal.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, AiError::ClarificationTimeout(5)));
    }

    #[test]
    fn test_agent_state_snapshot() {
        let mut ctx = ResearchContext::new();
        ctx.searches_used = 2;
        ctx.register_sources(vec![hit("a")]);
        let snapshot = ctx.agent_state();
        assert_eq!(snapshot["state"], "inited");
        assert_eq!(snapshot["searches_used"], 2);
        assert_eq!(snapshot["sources_count"], 1);
        assert!(snapshot["current_state_reasoning"].is_null());
    }
}
