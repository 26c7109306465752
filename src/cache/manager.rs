//! Cache Manager Module
//!
//! The facade the rest of the application talks to. Every store call runs
//! through the circuit breaker, and every failure other than a malformed key
//! is absorbed: reads miss, writes become no-ops and invalidations report
//! zero. The cache must never turn into a caller-visible failure.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::backend::{FileBackend, PersistentBackend};
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::cache::store::{CacheStore, MemoryStore};
use crate::config::{BackendKind, CacheConfig};
use crate::error::{CacheError, Result};
use crate::invalidation::{InvalidationContext, InvalidationEngine, OperationType};
use crate::keys::{validate_key, validate_pattern, ResourceType};
use crate::resilience::{CircuitBreaker, CircuitBreakerError};

/// Breaker component name, shown in logs and stats
const BREAKER_NAME: &str = "cache_store";

// == Cache Manager ==
/// Single source of truth for cached identity data.
///
/// Construct one per process and share it (usually behind an `Arc`) with
/// every collaborator that caches.
#[derive(Debug)]
pub struct CacheManager {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    breaker: CircuitBreaker,
    stats: Mutex<CacheStats>,
    /// Built on the first invalidation request
    engine: OnceLock<InvalidationEngine>,
}

impl CacheManager {
    // == Constructors ==
    /// Builds a manager and the store its configuration describes.
    ///
    /// Fails with [`CacheError::Configuration`] for an invalid configuration
    /// or an unusable backend location.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let mut store = MemoryStore::new(config.max_entries, config.sweep_every);
        if let BackendKind::File(dir) = &config.backend {
            let backend: Arc<dyn PersistentBackend> = Arc::new(FileBackend::new(dir)?);
            store = store.with_backend(backend);
            info!(dir = %dir.display(), "Cache persistence enabled");
        }

        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Builds a manager around an existing store.
    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        info!(
            enabled = config.enabled,
            default_ttl_secs = config.default_ttl.as_secs(),
            max_entries = config.max_entries,
            persistence = store.has_persistence(),
            "Cache manager initialized"
        );
        Self {
            breaker: CircuitBreaker::new(BREAKER_NAME, config.circuit_breaker),
            config,
            store,
            stats: Mutex::new(CacheStats::new()),
            engine: OnceLock::new(),
        }
    }

    /// In-memory manager with default settings, for tests.
    pub fn new_for_test() -> Self {
        let config = CacheConfig::default();
        let store = Arc::new(MemoryStore::new(config.max_entries, config.sweep_every));
        Self::with_store(config, store)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether entries are currently mirrored to a persistent backend.
    pub fn is_persistence_active(&self) -> bool {
        self.store.has_persistence()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    // == Guarded Execution ==
    /// Runs `f` against the store through the breaker, substituting
    /// `fallback` on any failure.
    fn guarded<T, F>(&self, operation: &'static str, fallback: T, f: F) -> T
    where
        F: FnOnce(&dyn CacheStore) -> Result<T>,
    {
        let result = self.breaker.call_with(
            || f(self.store.as_ref()),
            |err: &CacheError| !matches!(err, CacheError::InvalidKey(_)),
        );
        match result {
            Ok(value) => value,
            Err(err) => {
                self.degrade(operation, &err);
                fallback
            }
        }
    }

    fn degrade(&self, operation: &'static str, err: &CircuitBreakerError<CacheError>) {
        {
            let mut stats = self.stats.lock();
            if !err.is_circuit_open() {
                stats.record_error();
            }
            stats.record_degradation();
        }
        warn!(operation, error = %err, "Cache operation degraded");
    }

    // == Get ==
    /// Cached value for `key`, or `None`.
    ///
    /// Only a malformed key is an error; any store failure reads as a miss.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        if !self.config.enabled {
            return Ok(None);
        }

        let value = self.guarded("get", None, |store| store.get(key));
        let mut stats = self.stats.lock();
        match &value {
            Some(_) => {
                stats.record_hit();
                debug!(key = %key, "Cache hit");
            }
            None => {
                stats.record_miss();
                debug!(key = %key, "Cache miss");
            }
        }
        Ok(value)
    }

    // == Set ==
    /// Stores `value`; `ttl` defaults to the configured default TTL.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        validate_key(key)?;
        if !self.config.enabled {
            return Ok(());
        }

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let stored = self.guarded("set", false, |store| store.set(key, value, ttl).map(|_| true));
        if stored {
            self.stats.lock().record_set();
        }
        Ok(())
    }

    /// Removes one key, returning whether a live entry went.
    pub fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        if !self.config.enabled {
            return Ok(false);
        }

        match self.guarded("delete", None, |store| store.delete(key).map(Some)) {
            Some(removed) => {
                self.stats.lock().record_delete();
                debug!(key = %key, removed, "Deleted key");
                Ok(removed)
            }
            None => Ok(false),
        }
    }

    // == Invalidate ==
    /// Removes every key matching the glob `pattern`; `0` on failure.
    pub fn invalidate(&self, pattern: &str) -> Result<usize> {
        validate_pattern(pattern)?;
        if !self.config.enabled {
            return Ok(0);
        }

        let removed = self.guarded("invalidate", None, |store| store.invalidate(pattern).map(Some));
        match removed {
            Some(count) => {
                self.stats.lock().record_invalidation();
                debug!(pattern = %pattern, removed = count, "Invalidated pattern");
                Ok(count)
            }
            None => Ok(0),
        }
    }

    /// Removes everything, including persisted entries.
    pub fn clear(&self) {
        let cleared = self.guarded("clear", false, |store| store.clear().map(|_| true));
        if cleared {
            self.stats.lock().record_clear();
            info!("Cache cleared");
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        if !self.config.enabled {
            return Ok(false);
        }
        Ok(self.guarded("exists", false, |store| store.exists(key)))
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.guarded("keys", Vec::new(), |store| store.keys())
    }

    /// Housekeeping pass reclaiming expired entries.
    pub fn purge_expired(&self) -> usize {
        self.guarded("purge_expired", 0, |store| store.purge_expired())
    }

    // == Invalidate For Operation ==
    /// Invalidates everything a write may have made stale.
    ///
    /// Returns the number of entries removed across all generated patterns.
    pub fn invalidate_for_operation(
        &self,
        operation: OperationType,
        resource: ResourceType,
        resource_id: Option<&str>,
        context: &InvalidationContext,
    ) -> usize {
        if !self.config.enabled {
            return 0;
        }

        let engine = self.invalidation_engine();
        engine.invalidate_for_operation(operation, resource, resource_id, context, |pattern| {
            self.invalidate(pattern).unwrap_or_else(|e| {
                warn!(pattern = %pattern, error = %e, "Skipping malformed generated pattern");
                0
            })
        })
    }

    /// The lazily built invalidation engine.
    pub fn invalidation_engine(&self) -> &InvalidationEngine {
        self.engine.get_or_init(InvalidationEngine::new)
    }

    // == Stats ==
    /// Counters, hit rate and circuit breaker state.
    pub fn stats(&self) -> StatsSnapshot {
        let counters = self.stats.lock().clone();
        StatsSnapshot {
            enabled: self.config.enabled,
            hit_rate: counters.hit_rate(),
            hits: counters.hits,
            misses: counters.misses,
            sets: counters.sets,
            deletes: counters.deletes,
            invalidations: counters.invalidations,
            clears: counters.clears,
            errors: counters.errors,
            degradations: counters.degradations,
            total_entries: self.store.len(),
            evictions: self.store.evictions(),
            persistence_active: self.store.has_persistence(),
            circuit_breaker: self.breaker.stats(),
            generated_at: Utc::now(),
        }
    }

    /// Empties the store and zeroes counters and breaker state.
    pub fn reset(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Store clear failed during reset");
        }
        *self.stats.lock() = CacheStats::new();
        self.breaker.reset();
    }
}
