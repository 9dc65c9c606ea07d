use axum::{extract::State, routing::post, Json, Router};
use deskpilot_schema::StopResponse;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/stop", post(stop))
}

async fn stop(State(state): State<AppState>) -> Json<StopResponse> {
    state.controller.stop();
    Json(StopResponse {
        success: true,
        message: "Agent stopped".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use deskpilot_schema::AgentStatus;
    use tower::ServiceExt;

    use super::router;
    use crate::routes::test_support::{json_body, post_json, setup_state};

    #[tokio::test]
    async fn stop_when_idle_still_succeeds() {
        let (state, store) = setup_state(None);
        let app = router().with_state(state);

        let response = app.oneshot(post_json("/stop", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Agent stopped");
        assert_eq!(store.snapshot().status, AgentStatus::End);
    }

    #[tokio::test]
    async fn stop_cancels_active_run() {
        let (state, store) = setup_state(None);
        state.controller.start("long task").unwrap();
        let token = store.snapshot().cancellation.unwrap();
        let app = router().with_state(state);

        let response = app.oneshot(post_json("/stop", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(token.is_cancelled());

        let mut rx = store.subscribe();
        let settled = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.cancellation.is_none()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(settled.status, AgentStatus::End);
        assert!(!settled.thinking);
    }
}
