//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lorekeeper_core::error::GameError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The engine could not be wired or its schema prepared.
    #[error("engine error: {0}")]
    Engine(#[from] GameError),

    /// HTTP client construction error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorBody {
    /// A response with `status` and this body.
    pub fn respond(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
        (
            status,
            Json(Self {
                error,
                message: message.into(),
            }),
        )
            .into_response()
    }
}

/// HTTP-layer wrapper around `GameError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            GameError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            GameError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            GameError::Consistency(_) => (StatusCode::CONFLICT, "consistency_error"),
            GameError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            GameError::MalformedPayload(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "malformed_payload")
            }
            GameError::TransientProvider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            GameError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };

        ErrorBody::respond(status, error_code, self.0.to_string())
    }
}
