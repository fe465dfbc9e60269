pub mod agents;
pub mod chat;
pub mod models;
pub mod response;
pub mod state;

pub use response::{ApiError, ApiResponse};

use axum::{
    Json, Router,
    http::{Method, header},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use agents::{get_agent_state, list_agents};
use chat::{chat_completions, provide_clarification};
use models::list_models;
use state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
}

async fn health() -> Json<ApiResponse<Health>> {
    Json(ApiResponse::ok(Health {
        status: "healthy",
        service: "DeepResearch API",
    }))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            header::HeaderName::from_static(chat::AGENT_ID_HEADER),
            header::HeaderName::from_static(chat::AGENT_MODEL_HEADER),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/agents", get(list_agents))
        .route("/agents/{id}/state", get(get_agent_state))
        .route(
            "/agents/{id}/provide_clarification",
            post(provide_clarification),
        )
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use deepresearch_ai::MockStep;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn decision(function: Value) -> MockStep {
        MockStep::json(json!({
            "reasoning_steps": ["assess", "act"],
            "current_situation": "working",
            "plan_status": "on track",
            "remaining_steps": ["next"],
            "task_completed": false,
            "function": function
        }))
    }

    fn completion() -> MockStep {
        decision(json!({
            "tool_name_discriminator": "agent_completion",
            "reasoning": "done",
            "completed_steps": ["answered"],
            "status": "completed"
        }))
    }

    fn clarification() -> MockStep {
        decision(json!({
            "tool_name_discriminator": "clarification",
            "reasoning": "ambiguous",
            "unclear_terms": ["market"],
            "assumptions": ["EU", "cars"],
            "questions": ["Which region?", "Which years?", "Which segment?"]
        }))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn app(steps: Vec<MockStep>) -> (Router, AppState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = state::testing::state(steps, dir.path());
        (router(state.clone()), state, dir)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _dir) = app(vec![]);
        let response = app.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_non_streaming_request_is_not_implemented() {
        let (app, state, _dir) = app(vec![]);
        let response = app
            .oneshot(post_json(
                "/v1/chat/completions",
                json!({"model": "sgr-agent", "stream": false, "messages": [{"role": "user", "content": "q"}]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_is_rejected() {
        let (app, _, _dir) = app(vec![]);
        let response = app
            .oneshot(post_json(
                "/v1/chat/completions",
                json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "q"}]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("Invalid model"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let (app, _, _dir) = app(vec![]);
        let response = app
            .clone()
            .oneshot(get("/agents/sgr_agent_missing/state"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post_json(
                "/agents/sgr_agent_missing/provide_clarification",
                json!({"messages": [{"role": "user", "content": "EU"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_completion_streams_until_done() {
        let (app, state, _dir) = app(vec![completion()]);
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/chat/completions",
                json!({"messages": [{"role": "user", "content": "Summarize Rust 2024"}]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let agent_id = response.headers()[chat::AGENT_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        assert!(agent_id.starts_with("sgr_agent_"));
        assert_eq!(response.headers()[chat::AGENT_MODEL_HEADER], "sgr-agent");

        let body = body_text(response).await;
        assert!(body.contains("chat.completion.chunk"));
        assert!(body.contains("agent_completion"));
        assert!(body.trim_end().ends_with("data: [DONE]"));

        let response = app.clone().oneshot(get("/agents")).await.unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed["data"]["total"], 1);
        assert_eq!(listed["data"]["agents"][0]["agent_id"], agent_id.as_str());

        let response = app
            .oneshot(get(&format!("/agents/{agent_id}/state")))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["state"], "completed");
        assert_eq!(body["data"]["iteration"], 1);
        assert_eq!(body["data"]["current_state"]["plan_status"], "on track");
        assert_eq!(state.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_clarification_round_trip_over_http() {
        let (app, _, _dir) = app(vec![clarification(), completion()]);
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/chat/completions",
                json!({"model": "sgr-agent", "messages": [{"role": "user", "content": "Research the market"}]}),
            ))
            .await
            .unwrap();
        let agent_id = response.headers()[chat::AGENT_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();

        // The first stream ends at the pause.
        let first = body_text(response).await;
        assert!(first.contains("Which region?"));
        assert!(first.trim_end().ends_with("data: [DONE]"));

        let response = app
            .clone()
            .oneshot(get(&format!("/agents/{agent_id}/state")))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await["data"]["state"],
            "waiting_for_clarification"
        );

        // Sending the agent id as the model resumes that agent.
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/chat/completions",
                json!({"model": agent_id, "messages": [{"role": "user", "content": "EU, 2020-2024"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second = body_text(response).await;
        assert!(second.contains("agent_completion"));
        assert!(!second.contains("Which region?"));

        let response = app
            .clone()
            .oneshot(get(&format!("/agents/{agent_id}/state")))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["state"], "completed");
        assert_eq!(body["data"]["clarifications_used"], 1);

        // Finished agents no longer accept clarifications.
        let response = app
            .oneshot(post_json(
                &format!("/agents/{agent_id}/provide_clarification"),
                json!({"messages": [{"role": "user", "content": "more"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
