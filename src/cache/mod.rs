//! Cache Module
//!
//! TTL store, optional persistent mirror, glob invalidation and the
//! circuit-breaking manager facade.

pub mod backend;
mod entry;
pub mod global;
mod manager;
pub mod pattern;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::{FileBackend, PersistentBackend};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use manager::CacheManager;
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{CacheStore, MemoryStore};
