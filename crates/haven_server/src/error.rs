use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use haven_chat::ChatError;
use serde_json::json;

/// Error returned by the JSON endpoints.
#[derive(Debug)]
pub enum AppError {
    /// Unusable request (400)
    BadRequest(String),
    /// Model service failed (503)
    Upstream(String),
    /// Anything else (500)
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Input(message) => Self::BadRequest(message),
            ChatError::Upstream(_) | ChatError::GenerationFailed(_) => Self::Upstream(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Upstream(message) => {
                tracing::warn!(error = %message, "Upstream failure");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            AppError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
