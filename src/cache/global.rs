//! Process-wide cache accessor for the composition root.
//!
//! Library code takes a `CacheManager` by injection; only the binary's
//! startup path should reach for this. The first successful [`init`] wins
//! and later configurations are ignored.

use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::cache::CacheManager;
use crate::config::CacheConfig;
use crate::error::Result;

static GLOBAL_CACHE: OnceLock<Arc<CacheManager>> = OnceLock::new();

/// Builds the shared manager on first call; later calls return it unchanged.
pub fn init(config: CacheConfig) -> Result<Arc<CacheManager>> {
    if let Some(existing) = GLOBAL_CACHE.get() {
        warn!("Cache manager already initialized, ignoring new configuration");
        return Ok(Arc::clone(existing));
    }

    let manager = Arc::new(CacheManager::new(config)?);
    Ok(Arc::clone(GLOBAL_CACHE.get_or_init(|| manager)))
}

/// The shared manager, if [`init`] has run.
pub fn get() -> Option<Arc<CacheManager>> {
    GLOBAL_CACHE.get().cloned()
}
