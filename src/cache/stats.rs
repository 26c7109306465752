//! Cache Statistics Module
//!
//! Counters owned by the cache manager, plus the snapshot handed to
//! monitoring collaborators.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resilience::CircuitBreakerStats;

// == Cache Stats ==
/// Tracks cache performance and failure counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Successful lookups
    pub hits: u64,
    /// Lookups that found nothing (including expired entries)
    pub misses: u64,
    /// Values stored
    pub sets: u64,
    /// Single-key delete calls applied
    pub deletes: u64,
    /// Invalidation calls applied
    pub invalidations: u64,
    /// Full clears
    pub clears: u64,
    /// Underlying store failures
    pub errors: u64,
    /// Calls answered by the degradation fallback
    pub degradations: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Hit rate as a percentage, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_invalidation(&mut self) {
        self.invalidations += 1;
    }

    pub fn record_clear(&mut self) {
        self.clears += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_degradation(&mut self) {
        self.degradations += 1;
    }
}

// == Stats Snapshot ==
/// Read-only view of the whole cache, intended for periodic polling.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub invalidations: u64,
    pub clears: u64,
    pub errors: u64,
    pub degradations: u64,
    /// Percentage of lookups served from cache
    pub hit_rate: f64,
    /// Live in-memory entries
    pub total_entries: usize,
    /// Entries removed to respect the capacity bound
    pub evictions: u64,
    pub persistence_active: bool,
    pub circuit_breaker: CircuitBreakerStats,
    pub generated_at: DateTime<Utc>,
}
