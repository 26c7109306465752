//! Error types for the caching layer
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
/// Unified error type for the caching layer.
///
/// Only `InvalidKey` is ever surfaced by [`crate::cache::CacheManager`];
/// every other kind is absorbed there and turned into a miss, a no-op or a
/// zero count.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Malformed key or pattern (caller bug)
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Failure inside the store or the persistent backend
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// The circuit breaker rejected the call without running it
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Payload could not be encoded or decoded for persistence
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid cache configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// True for failures of the storage machinery itself.
    ///
    /// `CircuitOpen` counts as a backend error: it is raised on behalf of a
    /// backend that has been failing.
    pub fn is_backend(&self) -> bool {
        matches!(self, CacheError::Backend(_) | CacheError::CircuitOpen { .. })
    }

    /// Short machine-friendly name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::InvalidKey(_) => "invalid_key",
            CacheError::Backend(_) => "backend",
            CacheError::CircuitOpen { .. } => "circuit_open",
            CacheError::Serialization(_) => "serialization",
            CacheError::Configuration(_) => "configuration",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            CacheError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Backend(_)
            | CacheError::Serialization(_)
            | CacheError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string(), self.kind()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching layer.
pub type Result<T> = std::result::Result<T, CacheError>;
