//! # Circuit Breaker Implementation
//!
//! Classic three-state breaker: Closed (normal operation), Open (failing
//! fast) and HalfOpen (probing recovery). The whole read-decide-mutate
//! sequence on the state runs under a single mutex; the protected operation
//! itself runs without holding it.

use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::CircuitBreakerConfig;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - calls are let through as probes
    HalfOpen,
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not invoked
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and failed
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the call was rejected without running.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }
}

/// Point-in-time view of a breaker, safe to hand to monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_secs: f64,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Calls refused while open
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    rejected_calls: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_failure_at: None,
            rejected_calls: 0,
        }
    }
}

/// Failure-detecting wrapper around any fallible operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    /// Current circuit state, without evaluating the recovery timeout.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation; every error counts toward the failure threshold.
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_with(operation, |_| true)
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// Only errors for which `is_expected` returns true are recorded as
    /// failures. Other errors pass through untouched and leave the circuit
    /// state alone.
    pub fn call_with<T, E, F, P>(
        &self,
        operation: F,
        is_expected: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        if !self.allow_call() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        match operation() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if is_expected(&err) {
                    self.record_failure();
                } else {
                    debug!(component = %self.name, "Unexpected error ignored by circuit breaker");
                }
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    /// Decides whether a call may run, moving Open to HalfOpen once the
    /// recovery timeout has elapsed.
    fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    info!(
                        component = %self.name,
                        success_threshold = self.config.success_threshold,
                        "Circuit breaker half-open (testing recovery)"
                    );
                    true
                } else {
                    inner.rejected_calls += 1;
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    info!(component = %self.name, "Circuit breaker closed (recovered)");
                }
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    error!(
                        component = %self.name,
                        failure_count = inner.failure_count,
                        failure_threshold = self.config.failure_threshold,
                        "Circuit breaker opened (failing fast)"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.failure_count += 1;
                inner.success_count = 0;
                inner.state = CircuitState::Open;
                error!(component = %self.name, "Probe failed, circuit breaker re-opened");
            }
            CircuitState::Open => {
                inner.failure_count += 1;
            }
        }
    }

    /// Force circuit to open state
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.last_failure_time = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());
    }

    /// Return to a fresh closed state, clearing all counters.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::closed();
        info!(component = %self.name, "Circuit breaker reset");
    }

    /// Snapshot of state, counters and thresholds.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs_f64(),
            last_failure_at: inner.last_failure_at,
            rejected_calls: inner.rejected_calls,
        }
    }
}
