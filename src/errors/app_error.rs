use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::core::asr::AsrError;

/// Application error type, rendered as the OpenAI error envelope
/// `{"error": {"message": ..., "type": ...}}`.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg) | AppError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        match &self {
            AppError::BadRequest(msg) => tracing::warn!("Bad request: {}", msg),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
        }

        let body = Json(json!({
            "error": {
                "message": self.message(),
                "type": kind
            }
        }));

        (status, body).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            AppError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<AsrError> for AppError {
    fn from(err: AsrError) -> Self {
        let message = format!("Transcription failed: {err}");
        if err.is_client_error() {
            AppError::BadRequest(message)
        } else {
            AppError::Internal(message)
        }
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
