//! Resilience Module
//!
//! Circuit breaking for the cache store. A failing store is isolated after
//! repeated failures so that it stops adding latency to every cache call,
//! and is probed again once the recovery timeout has passed.
//!
//! ```rust
//! use idcache::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("cache_store", CircuitBreakerConfig::default());
//! let result = breaker.call(|| Ok::<_, String>("value"));
//! assert!(result.is_ok());
//! ```

mod circuit_breaker;

use std::time::Duration;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitBreakerStats, CircuitState};

/// Thresholds for a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive qualifying failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is allowed
    pub recovery_timeout: Duration,
    /// Successful probes needed to close a half-open circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}
