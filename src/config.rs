//! Configuration Module
//!
//! Loads the cache configuration once at startup from environment variables.
//! The resulting [`CacheConfig`] is immutable; anything that depends on live
//! backend state is a query method on the manager instead.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::resilience::CircuitBreakerConfig;

/// Where cache entries are mirrored for warm restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process only
    Memory,
    /// One file per entry under the given directory
    File(PathBuf),
}

impl BackendKind {
    /// Parses a `CACHE_BACKEND` value; `dir` is required for `file`.
    pub fn parse(kind: &str, dir: Option<PathBuf>) -> Result<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(BackendKind::Memory),
            "file" => dir.map(BackendKind::File).ok_or_else(|| {
                CacheError::Configuration("file backend requires CACHE_DIR".to_string())
            }),
            other => Err(CacheError::Configuration(format!(
                "unknown cache backend '{}'",
                other
            ))),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch; a disabled cache always misses
    pub enabled: bool,
    /// TTL for entries without a more specific TTL
    pub default_ttl: Duration,
    /// TTL for `list` reads
    pub list_ttl: Duration,
    /// TTL for `describe`/`get` reads
    pub describe_ttl: Duration,
    /// Maximum number of in-memory entries
    pub max_entries: usize,
    /// Number of writes between two expired-entry sweeps
    pub sweep_every: u64,
    /// Persistent backend selection
    pub backend: BackendKind,
    /// Circuit breaker thresholds guarding every store call
    pub circuit_breaker: CircuitBreakerConfig,
    /// Admin HTTP server port
    pub server_port: u16,
    /// Background sweep interval in seconds
    pub cleanup_interval: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ENABLED` - Enable caching (default: true)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_LIST_TTL` - TTL for list reads in seconds (default: 120)
    /// - `CACHE_DESCRIBE_TTL` - TTL for describe/get reads in seconds (default: 600)
    /// - `CACHE_MAX_ENTRIES` - Maximum in-memory entries (default: 10000)
    /// - `CACHE_SWEEP_EVERY` - Writes between expiry sweeps (default: 100)
    /// - `CACHE_BACKEND` - `memory` or `file` (default: memory)
    /// - `CACHE_DIR` - Directory for the file backend
    /// - `CACHE_CB_FAILURE_THRESHOLD` - Failures before opening (default: 5)
    /// - `CACHE_CB_RECOVERY_TIMEOUT` - Seconds before probing (default: 60)
    /// - `CACHE_CB_SUCCESS_THRESHOLD` - Probe successes before closing (default: 2)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 30)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let backend = BackendKind::parse(
            &env::var("CACHE_BACKEND").unwrap_or_default(),
            env::var("CACHE_DIR").ok().map(PathBuf::from),
        )?;

        let config = Self {
            enabled: env_parse("CACHE_ENABLED").unwrap_or(defaults.enabled),
            default_ttl: env_secs("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            list_ttl: env_secs("CACHE_LIST_TTL").unwrap_or(defaults.list_ttl),
            describe_ttl: env_secs("CACHE_DESCRIBE_TTL").unwrap_or(defaults.describe_ttl),
            max_entries: env_parse("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            sweep_every: env_parse("CACHE_SWEEP_EVERY").unwrap_or(defaults.sweep_every),
            backend,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_parse("CACHE_CB_FAILURE_THRESHOLD")
                    .unwrap_or(defaults.circuit_breaker.failure_threshold),
                recovery_timeout: env_secs("CACHE_CB_RECOVERY_TIMEOUT")
                    .unwrap_or(defaults.circuit_breaker.recovery_timeout),
                success_threshold: env_parse("CACHE_CB_SUCCESS_THRESHOLD")
                    .unwrap_or(defaults.circuit_breaker.success_threshold),
            },
            server_port: env_parse("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: env_parse("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::Configuration(
                "max_entries must be greater than zero".to_string(),
            ));
        }
        if self.sweep_every == 0 {
            return Err(CacheError::Configuration(
                "sweep_every must be greater than zero".to_string(),
            ));
        }
        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
            return Err(CacheError::Configuration(
                "circuit breaker thresholds must be greater than zero".to_string(),
            ));
        }
        if let BackendKind::File(path) = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(CacheError::Configuration(
                    "file backend path is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(300),
            list_ttl: Duration::from_secs(120),
            describe_ttl: Duration::from_secs(600),
            max_entries: 10_000,
            sweep_every: 100,
            backend: BackendKind::Memory,
            circuit_breaker: CircuitBreakerConfig::default(),
            server_port: 3000,
            cleanup_interval: 30,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}
