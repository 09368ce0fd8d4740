use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use causerie_core::CoreError;
use thiserror::Error;

/// HTTP-facing wrapper for the coordination layer's error taxonomy.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub CoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoreError::Auth => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            CoreError::Authz(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            CoreError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            CoreError::State(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            CoreError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
