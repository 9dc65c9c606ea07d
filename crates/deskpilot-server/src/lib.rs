pub mod auth;
pub mod control;
pub mod error;
pub mod routes;
pub mod state;

use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

pub use control::{ControlError, ControlService};

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::control_router())
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::create_router;
    use crate::routes::test_support::{json_body, post_json, setup_state};

    fn get(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (state, _store) = setup_state(None);
        let app = create_router(state);

        let response = app.oneshot(get("/nope", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error": "Not Found" })
        );
    }

    #[tokio::test]
    async fn wrong_method_is_not_found() {
        let (state, store) = setup_state(None);
        let app = create_router(state);

        let response = app.clone().oneshot(get("/run", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Not Found");

        let response = app.oneshot(post_json("/health", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!store.snapshot().thinking);
    }

    #[tokio::test]
    async fn missing_key_is_unauthorized_and_leaves_state() {
        let (state, store) = setup_state(Some("secret"));
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(post_json("/run", r#"{"instructions":"Open Calculator app"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error": "Unauthorized" })
        );

        let response = app.oneshot(get("/health", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let snapshot = store.snapshot();
        assert!(!snapshot.thinking);
        assert!(snapshot.instructions.is_empty());
        assert!(snapshot.cancellation.is_none());
    }

    #[tokio::test]
    async fn matching_key_is_accepted() {
        let (state, _store) = setup_state(Some("secret"));
        let app = create_router(state);

        let response = app.oneshot(get("/status", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_still_requires_key() {
        let (state, _store) = setup_state(Some("secret"));
        let app = create_router(state);

        let response = app.oneshot(get("/nope", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn options_bypasses_auth_with_empty_body() {
        let (state, _store) = setup_state(Some("secret"));
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn cors_is_open() {
        let (state, _store) = setup_state(None);
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }
}
