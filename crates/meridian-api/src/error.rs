//! Meridian API — error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meridian_core::error::StoreError;
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

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// On a concurrency conflict, the aggregate's actual current maximum
    /// sequence number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_sequence_number: Option<i64>,
}

/// HTTP-layer wrapper around `StoreError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, current_sequence_number) = match &self.0 {
            StoreError::ConcurrencyConflict { current, .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict", Some(*current))
            }
            StoreError::DuplicateSubscriptionName(_) => {
                (StatusCode::CONFLICT, "duplicate_subscription_name", None)
            }
            StoreError::SubscriptionNotFound(_) => {
                (StatusCode::NOT_FOUND, "subscription_not_found", None)
            }
            StoreError::DeadLetterNotFound(_) => {
                (StatusCode::NOT_FOUND, "dead_letter_not_found", None)
            }
            StoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error", None),
            StoreError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
            current_sequence_number,
        };

        (status, Json(body)).into_response()
    }
}
