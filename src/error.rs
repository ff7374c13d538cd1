use crate::rate_limit::RateLimitError;
use crate::store::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Malformed request input
    BadRequest(String),
    /// Missing or unknown API key
    Unauthorized(String),
    /// Client is over its request ceiling
    TooManyRequests,
    /// Storage backend failure
    Storage(StorageError),
    /// Rate limit counter store failure
    RateLimit(RateLimitError),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::TooManyRequests => write!(f, "Too many requests"),
            Self::Storage(err) => write!(f, "Storage error: {}", err),
            Self::RateLimit(err) => write!(f, "Rate limit error: {}", err),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Backend text stays in the log; clients get a fixed message.
        let (status, error_message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
            Self::Storage(err) => {
                tracing::error!(error = %err, kind = err.kind(), "Storage operation failed");
                match err {
                    StorageError::Connection(_) | StorageError::WorkerUnavailable => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Storage temporarily unavailable".to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Storage error".to_string(),
                    ),
                }
            }
            Self::RateLimit(err) => {
                tracing::error!(error = %err, "Rate limit backend unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            Self::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::BadRequest(_) => "bad_request",
        AppError::Unauthorized(_) => "unauthorized",
        AppError::TooManyRequests => "rate_limited",
        AppError::Storage(_) => "storage_error",
        AppError::RateLimit(_) => "service_unavailable",
        AppError::InternalError(_) => "internal_error",
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        Self::RateLimit(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}
