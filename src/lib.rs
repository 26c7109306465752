//! idcache - Unified caching layer for an identity-administration client
//!
//! Caches read responses from the remote identity service under
//! deterministic keys, invalidates them by glob pattern when writes happen,
//! and keeps every cache failure away from callers behind a circuit breaker.
//!
//! The pieces, bottom-up:
//! - [`keys`] builds and validates cache keys
//! - [`cache`] holds the TTL store, optional file persistence and the
//!   [`CacheManager`] facade
//! - [`resilience`] provides the circuit breaker
//! - [`invalidation`] maps writes to the patterns they make stale
//! - [`client`] wraps a remote client so reads are cached and writes invalidate

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod models;
pub mod resilience;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheManager;
pub use client::{CachedClientWrapper, CallArgs, RemoteClient};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use invalidation::{InvalidationContext, InvalidationEngine, OperationType};
pub use keys::ResourceType;
pub use tasks::spawn_cleanup_task;
