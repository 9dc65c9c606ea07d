use axum::{extract::State, routing::get, Json, Router};
use deskpilot_schema::HealthResponse;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.controller.store().snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        agent_status: snapshot.status,
        is_running: snapshot.thinking,
    })
}
