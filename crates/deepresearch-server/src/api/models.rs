use axum::Json;
use deepresearch_ai::AgentKind;
use serde::Serialize;

const MODELS_CREATED: i64 = 1_700_000_000;

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

/// GET /v1/models - agent variants in the OpenAI list format
pub async fn list_models() -> Json<ModelList> {
    let data = AgentKind::ALL
        .iter()
        .map(|kind| ModelInfo {
            id: kind.model_name(),
            object: "model",
            created: MODELS_CREATED,
            owned_by: "deepresearch",
        })
        .collect();
    Json(ModelList {
        object: "list",
        data,
    })
}
