//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engines, stores and server.
///
/// Only construction and `set` ever raise these; `get` and `delete` fold
/// their failures into [`Lookup::Error`](crate::cache::Lookup) and `false`.
/// `NotFound` is produced by the HTTP handlers alone.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Empty or unnormalizable entry name or namespace
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Payload could not be serialized for storage
    #[error("Value rejected: {0}")]
    ValueRejected(String),

    /// Storage medium is unreachable or unusable
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Serialized payload exceeds the configured ceiling (strict size policy only)
    #[error("Value too large: {size} bytes exceeds limit of {limit} bytes")]
    ValueTooLarge { size: usize, limit: usize },

    /// Entry absent (HTTP surface only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidName(_) => StatusCode::BAD_REQUEST,
            CacheError::ValueRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::ValueTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
