use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Gate in front of every control route.
///
/// OPTIONS is answered here with an empty 200 so preflights never need a key.
/// When a key is configured every other request must carry it in `X-API-Key`.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    if let Some(expected) = state.api_key.as_deref() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .map(|value| value.as_bytes())
            .unwrap_or_default();
        if !bool::from(provided.ct_eq(expected.as_bytes())) {
            tracing::warn!(
                method = %request.method(),
                path = request.uri().path(),
                "rejected control request with missing or invalid api key"
            );
            return ApiError::unauthorized().into_response();
        }
    }

    next.run(request).await
}
