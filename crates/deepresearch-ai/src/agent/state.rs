//! Agent lifecycle state and the per-run execution log

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Inited,
    Researching,
    WaitingForClarification,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inited => "inited",
            Self::Researching => "researching",
            Self::WaitingForClarification => "waiting_for_clarification",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded step of an agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum LogStep {
    Reasoning {
        step_number: usize,
        timestamp: DateTime<Utc>,
        agent_reasoning: Value,
    },
    ToolExecution {
        step_number: usize,
        timestamp: DateTime<Utc>,
        tool_name: String,
        agent_tool_context: Value,
        agent_tool_execution_result: String,
    },
    Error {
        step_number: usize,
        timestamp: DateTime<Utc>,
        error: String,
    },
}

/// Full dump written when a run ends
#[derive(Debug, Clone, Serialize)]
pub struct AgentLog<'a> {
    pub id: &'a str,
    pub task: &'a str,
    pub context: Value,
    pub log: &'a [LogStep],
}

impl AgentLog<'_> {
    /// Write the log as `<timestamp>-<id>-log.json` under `dir`.
    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "{}-{}-log.json",
            Local::now().format("%Y%m%d-%H%M%S"),
            self.id
        ));
        let body = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
