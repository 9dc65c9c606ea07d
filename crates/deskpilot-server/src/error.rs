use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deskpilot_schema::ErrorBody;

/// Error envelope shared by every control endpoint: `{error, message?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: Option<String>) -> Self {
        Self { status, message }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, None)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, None)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Some(message.into()))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, Some(message.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, Some(message.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self
                .status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn error_name_follows_status() {
        let (status, body) = body_json(ApiError::conflict("Agent is already running")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Conflict");
        assert_eq!(body["message"], "Agent is already running");

        let (_, body) = body_json(ApiError::internal("EOF while parsing")).await;
        assert_eq!(body["error"], "Internal Server Error");
    }

    #[tokio::test]
    async fn message_is_omitted_when_absent() {
        let (status, body) = body_json(ApiError::unauthorized()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({ "error": "Unauthorized" }));
    }
}
