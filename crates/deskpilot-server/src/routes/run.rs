use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use deskpilot_schema::RunAccepted;
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/run", post(run))
}

/// Accepts a run and answers before the runner finishes.
///
/// The body is parsed by hand so that malformed JSON surfaces as a 500 with the
/// parser message instead of axum's extractor rejection.
async fn run(State(state): State<AppState>, body: Bytes) -> Result<Json<RunAccepted>, ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|err| {
        tracing::error!("failed to parse /run body: {err}");
        ApiError::internal(err.to_string())
    })?;

    let instructions = payload
        .get("instructions")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("instructions is required and must be a string"))?
        .to_string();

    let run_id = state
        .controller
        .start(instructions.clone())
        .map_err(|err| ApiError::conflict(err.to_string()))?;
    tracing::info!(%run_id, "run started over http");

    Ok(Json(RunAccepted {
        success: true,
        message: "Agent started".to_string(),
        instructions,
    }))
}
