use axum::{extract::State, routing::get, Json, Router};
use deskpilot_schema::StatusResponse;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.controller.store().snapshot();
    Json(StatusResponse {
        status: snapshot.status,
        instructions: snapshot.instructions,
        is_running: snapshot.thinking,
        message_count: snapshot.messages.len(),
    })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use deskpilot_core::RunStatePatch;
    use deskpilot_schema::{AgentStatus, ConversationEntry, Speaker};
    use tower::ServiceExt;

    use super::router;
    use crate::routes::test_support::{json_body, setup_state};

    #[tokio::test]
    async fn reports_progress() {
        let (state, store) = setup_state(None);
        store.merge(RunStatePatch {
            status: Some(AgentStatus::MaxLoop),
            instructions: Some("Open Calculator app".into()),
            messages: Some(vec![
                ConversationEntry::new(Speaker::Human, "Open Calculator app"),
                ConversationEntry::new(Speaker::Gpt, "click(10, 20)"),
            ]),
            ..Default::default()
        });
        let before = store.snapshot();
        let app = router().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "max_loop");
        assert_eq!(body["instructions"], "Open Calculator app");
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["messageCount"], 2);

        let after = store.snapshot();
        assert_eq!(after.status, before.status);
        assert_eq!(after.messages.len(), before.messages.len());
    }
}
