//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies. `GET /stats`
//! serializes [`crate::cache::StatsSnapshot`] directly.

use serde::Serialize;

use crate::resilience::CircuitState;

/// Response body for `GET /keys`
#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub count: usize,
    pub keys: Vec<String>,
}

impl KeysResponse {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            count: keys.len(),
            keys,
        }
    }
}

/// Response body for `DELETE /invalidate/:pattern`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    /// Entries removed
    pub removed: usize,
}

/// Response body for `POST /invalidate/operation`
#[derive(Debug, Clone, Serialize)]
pub struct OperationInvalidationResponse {
    /// Patterns applied, in order
    pub patterns: Vec<String>,
    pub removed: usize,
}

/// Response body for `DELETE /clear`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn new() -> Self {
        Self {
            message: "Cache cleared".to_string(),
        }
    }
}

impl Default for ClearResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body for `GET /rules/validate`
#[derive(Debug, Clone, Serialize)]
pub struct RulesValidationResponse {
    pub valid: bool,
    pub checked: usize,
    pub errors: Vec<String>,
}

/// Response body for the health endpoint (GET /health)
///
/// The cache degrades instead of failing, so an open circuit is reported as
/// `degraded` rather than as an HTTP error.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub cache_enabled: bool,
    pub circuit_state: CircuitState,
    pub persistence_active: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(cache_enabled: bool, circuit_state: CircuitState, persistence_active: bool) -> Self {
        let status = match circuit_state {
            CircuitState::Closed => "healthy",
            CircuitState::Open | CircuitState::HalfOpen => "degraded",
        };
        Self {
            status: status.to_string(),
            cache_enabled,
            circuit_state,
            persistence_active,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
    /// Machine-friendly error kind
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_response_counts() {
        let resp = KeysResponse::new(vec!["user:list".to_string(), "group:list".to_string()]);
        assert_eq!(resp.count, 2);
    }

    #[test]
    fn test_health_response_status() {
        assert_eq!(HealthResponse::new(true, CircuitState::Closed, false).status, "healthy");
        assert_eq!(HealthResponse::new(true, CircuitState::Open, false).status, "degraded");
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::new(true, CircuitState::HalfOpen, true);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["circuit_state"], "half_open");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Invalid cache key: empty", "invalid_key");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("invalid_key"));
        assert!(json.contains("Invalid cache key"));
    }
}
