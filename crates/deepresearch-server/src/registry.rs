//! In-process registry of research agents

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deepresearch_ai::{AiError, ResearchAgent, Result};
use parking_lot::RwLock;

/// How long a finished agent stays queryable before it is dropped.
pub const DEFAULT_AGENT_RETENTION: Duration = Duration::from_secs(3600);

type AgentMap = Arc<RwLock<HashMap<String, Arc<ResearchAgent>>>>;

/// Agents by id. Finished agents are evicted once the retention period
/// after their run has elapsed.
pub struct AgentRegistry {
    agents: AgentMap,
    retention: Duration,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self {
            agents: Arc::default(),
            retention: DEFAULT_AGENT_RETENTION,
        }
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Register `agent` and run it on a background task.
    pub fn spawn(&self, agent: ResearchAgent) -> Arc<ResearchAgent> {
        let agent = Arc::new(agent);
        self.agents
            .write()
            .insert(agent.id().to_string(), Arc::clone(&agent));

        let runner = Arc::clone(&agent);
        let agents = Arc::clone(&self.agents);
        let retention = self.retention;
        tokio::spawn(async move {
            let status = runner.execute().await;
            tokio::time::sleep(retention).await;
            evict(&agents, &runner);
            tracing::debug!(agent_id = %runner.id(), state = ?status, "Agent evicted");
        });
        tracing::info!(
            agent_id = %agent.id(),
            kind = %agent.kind(),
            "Agent registered and started"
        );
        agent
    }

    pub fn find(&self, id: &str) -> Option<Arc<ResearchAgent>> {
        self.agents.read().get(id).cloned()
    }

    pub fn get(&self, id: &str) -> Result<Arc<ResearchAgent>> {
        self.find(id)
            .ok_or_else(|| AiError::AgentNotFound(id.to_string()))
    }

    /// All agents, ordered by id
    pub fn list(&self) -> Vec<Arc<ResearchAgent>> {
        let mut agents: Vec<_> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.id().cmp(b.id()));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remove `agent` unless its id has been taken by another entry.
fn evict(agents: &AgentMap, agent: &Arc<ResearchAgent>) {
    let mut agents = agents.write();
    if agents
        .get(agent.id())
        .is_some_and(|entry| Arc::ptr_eq(entry, agent))
    {
        agents.remove(agent.id());
    }
}
