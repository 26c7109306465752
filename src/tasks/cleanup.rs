//! Expired Entry Sweep Task
//!
//! Background task that periodically reclaims expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheManager;

/// Spawns a background task that calls [`CacheManager::purge_expired`]
/// every `cleanup_interval_secs` seconds.
///
/// Expired entries are already invisible to readers; this only returns
/// their memory sooner. The returned handle is aborted during graceful
/// shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(CacheManager::new_for_test());
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 30);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: Arc<CacheManager>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting expired entry sweep task"
        );

        loop {
            tokio::time::sleep(interval).await;

            // The store locks briefly per call; nothing here holds across an await
            let removed = cache.purge_expired();

            if removed > 0 {
                info!(removed, "Expired entry sweep completed");
            } else {
                debug!("Expired entry sweep: nothing to remove");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryStore};
    use crate::config::CacheConfig;
    use serde_json::json;

    fn manager_with_store() -> (Arc<CacheManager>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(100, 1_000));
        let manager = CacheManager::with_store(CacheConfig::default(), store.clone());
        (Arc::new(manager), store)
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let (cache, store) = manager_with_store();
        cache
            .set("user:list", json!(["u1"]), Some(Duration::from_millis(200)))
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Counted straight from the store: a manager read would purge on its own
        assert_eq!(store.len(), 0, "Expired entry should have been swept");
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let (cache, _store) = manager_with_store();
        cache
            .set("user:list", json!(["u1"]), Some(Duration::from_secs(3600)))
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get("user:list").unwrap(), Some(json!(["u1"])));
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let (cache, _store) = manager_with_store();

        let handle = spawn_cleanup_task(cache, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
