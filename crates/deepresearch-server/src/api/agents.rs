use axum::{
    Json,
    extract::{Path, State},
};
use deepresearch_ai::{AgentStatus, ResearchAgent};
use serde::Serialize;
use serde_json::Value;

use crate::api::{ApiError, ApiResponse, state::AppState};

#[derive(Debug, Serialize)]
pub struct AgentListItem {
    pub agent_id: String,
    pub task: String,
    pub state: AgentStatus,
}

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentListItem>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct AgentStateResponse {
    pub agent_id: String,
    pub task: String,
    pub model: &'static str,
    pub state: AgentStatus,
    pub iteration: usize,
    pub searches_used: usize,
    pub clarifications_used: usize,
    pub sources_count: usize,
    /// Latest reasoning step, if any
    pub current_state: Option<Value>,
}

impl AgentStateResponse {
    fn from_agent(agent: &ResearchAgent) -> Result<Self, ApiError> {
        let context = agent.context();
        let ctx = context.lock();
        let current_state = ctx
            .current_reasoning
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::from(deepresearch_ai::AiError::from(e)))?;
        Ok(Self {
            agent_id: agent.id().to_string(),
            task: agent.task().to_string(),
            model: agent.kind().model_name(),
            state: ctx.state,
            iteration: ctx.iteration,
            searches_used: ctx.searches_used,
            clarifications_used: ctx.clarifications_used,
            sources_count: ctx.sources.len(),
            current_state,
        })
    }
}

// GET /agents
pub async fn list_agents(State(state): State<AppState>) -> Json<ApiResponse<AgentListResponse>> {
    let agents: Vec<AgentListItem> = state
        .registry
        .list()
        .iter()
        .map(|agent| AgentListItem {
            agent_id: agent.id().to_string(),
            task: agent.task().to_string(),
            state: agent.state(),
        })
        .collect();
    let total = agents.len();
    Json(ApiResponse::ok(AgentListResponse { agents, total }))
}

// GET /agents/{id}/state
pub async fn get_agent_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AgentStateResponse>>, ApiError> {
    let agent = state.registry.get(&id)?;
    Ok(Json(ApiResponse::ok(AgentStateResponse::from_agent(&agent)?)))
}
