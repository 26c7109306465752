//! Cache Store Module
//!
//! Concurrent key/entry map with lazy TTL expiry, a capacity bound, glob
//! invalidation and an optional persistent backend mirror.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::backend::PersistentBackend;
use crate::cache::entry::current_timestamp_ms;
use crate::cache::{pattern, CacheEntry};
use crate::error::{CacheError, Result};

// == Cache Store Trait ==
/// Storage seam used by [`crate::cache::CacheManager`].
///
/// Implementations must be safe to call from any number of threads.
pub trait CacheStore: Send + Sync + Debug {
    /// Live value for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key` for `ttl`; last writer wins.
    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Removes one key, returning whether a live entry was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key matching the glob `pattern`, returning the count.
    fn invalidate(&self, pattern: &str) -> Result<usize>;

    /// Removes everything, including persisted entries.
    fn clear(&self) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Live keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;

    /// Physically removes expired entries, returning how many went.
    fn purge_expired(&self) -> Result<usize>;

    /// Number of entries currently held in memory.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries dropped to respect the capacity bound.
    fn evictions(&self) -> u64 {
        0
    }

    /// Whether entries are mirrored to a persistent backend.
    fn has_persistence(&self) -> bool {
        false
    }
}

// == Memory Store ==
/// In-process [`CacheStore`].
///
/// Expiry is lazy: a read of an expired entry removes it. Every
/// `sweep_every` writes a full sweep reclaims entries nobody re-read. When
/// full, a new key first triggers a sweep and then evicts the entry closest
/// to expiry.
///
/// Backend I/O always happens outside the map lock. Removals bump a
/// generation counter under the lock, so a `set` whose backend write
/// overlapped an invalidation removes its own file again, and a read-through
/// that overlapped one is not rehydrated.
#[derive(Debug)]
pub struct MemoryStore {
    /// Key-entry storage
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Optional warm-restart mirror
    backend: Option<Arc<dyn PersistentBackend>>,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Writes between sweeps
    sweep_every: u64,
    writes: AtomicU64,
    evictions: AtomicU64,
    /// Bumped by every removal, under the map lock
    generation: AtomicU64,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` entries.
    pub fn new(max_entries: usize, sweep_every: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            backend: None,
            max_entries: max_entries.max(1),
            sweep_every: sweep_every.max(1),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Attaches a persistent backend mirror.
    pub fn with_backend(mut self, backend: Arc<dyn PersistentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Inserts under the lock, returning the generation it was inserted at.
    fn insert_entry(&self, key: &str, entry: CacheEntry) -> u64 {
        let mut entries = self.entries.lock();
        self.make_room(&mut entries, key);
        entries.insert(key.to_string(), entry);
        self.generation.load(Ordering::Acquire)
    }

    /// Inserts a rehydrated entry unless a removal ran since `seen`.
    fn rehydrate(&self, key: &str, entry: CacheEntry, seen: u64) -> bool {
        let mut entries = self.entries.lock();
        if self.generation.load(Ordering::Acquire) != seen {
            return false;
        }
        self.make_room(&mut entries, key);
        entries.insert(key.to_string(), entry);
        true
    }

    /// Must be called with the map locked.
    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Sweeps, then evicts the entry closest to expiry, if `key` is new and
    /// the store is full.
    fn make_room(&self, entries: &mut HashMap<String, CacheEntry>, key: &str) {
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let now = current_timestamp_ms();
            entries.retain(|_, e| !e.is_expired_at(now));

            if entries.len() >= self.max_entries {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    entries.remove(&victim);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %victim, "Evicted entry closest to expiry");
                }
            }
        }
    }

    /// Mirrors an entry inserted at generation `inserted_at`.
    fn persist(&self, key: &str, entry: &CacheEntry, inserted_at: u64) {
        let Some(backend) = &self.backend else {
            return;
        };
        let ttl_secs = entry.ttl_remaining_secs();
        if ttl_secs == 0 {
            return;
        }
        let outcome = serde_json::to_vec(entry)
            .map_err(CacheError::from)
            .and_then(|bytes| backend.set(key, &bytes, ttl_secs));
        if let Err(e) = outcome {
            warn!(key = %key, error = %e, "Failed to persist cache entry");
            return;
        }

        // A removal that ran meanwhile may have missed the new file
        let raced = self.generation.load(Ordering::Acquire) != inserted_at
            && !self.entries.lock().contains_key(key);
        if raced {
            debug!(key = %key, "Entry removed while persisting, dropping mirror");
            self.backend_invalidate(Some(key));
        }
    }

    /// Backend read-through; any failure is a miss.
    fn load_persisted(&self, key: &str) -> Option<CacheEntry> {
        let backend = self.backend.as_ref()?;
        let bytes = match backend.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Persistent backend read failed");
                return None;
            }
        };
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if !entry.is_expired() => Some(entry),
            Ok(_) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable persisted entry");
                None
            }
        }
    }

    fn backend_keys(&self) -> Vec<String> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        backend.list_keys().unwrap_or_else(|e| {
            warn!(error = %e, "Persistent backend listing failed");
            Vec::new()
        })
    }

    fn backend_invalidate(&self, key: Option<&str>) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.invalidate(key) {
                warn!(key = ?key, error = %e, "Persistent backend invalidation failed");
            }
        }
    }

    fn clear_all(&self) -> usize {
        let persisted: HashSet<String> = self.backend_keys().into_iter().collect();
        let now = current_timestamp_ms();
        let removed: HashSet<String> = {
            let mut entries = self.entries.lock();
            self.bump_generation();
            entries
                .drain()
                .filter(|(_, e)| !e.is_expired_at(now))
                .map(|(k, _)| k)
                .collect()
        };
        self.backend_invalidate(None);
        removed.union(&persisted).count()
    }
}

impl CacheStore for MemoryStore {
    // == Get ==
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let seen = {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(key) {
                if entry.is_expired() {
                    entries.remove(key);
                    debug!(key = %key, "Removed expired entry on read");
                    return Ok(None);
                }
                return Ok(Some(entry.value.clone()));
            }
            self.generation.load(Ordering::Acquire)
        };

        match self.load_persisted(key) {
            Some(entry) => {
                let value = entry.value.clone();
                if self.rehydrate(key, entry, seen) {
                    debug!(key = %key, "Rehydrated entry from persistent backend");
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    // == Set ==
    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl);
        let inserted_at = self.insert_entry(key, entry.clone());

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.sweep_every == 0 {
            let removed = self.purge_expired()?;
            if removed > 0 {
                debug!(removed, "Write-triggered sweep removed expired entries");
            }
        }

        self.persist(key, &entry, inserted_at);
        Ok(())
    }

    // == Delete ==
    fn delete(&self, key: &str) -> Result<bool> {
        let removed = {
            let mut entries = self.entries.lock();
            self.bump_generation();
            entries.remove(key).is_some_and(|e| !e.is_expired())
        };
        self.backend_invalidate(Some(key));
        Ok(removed)
    }

    // == Invalidate ==
    fn invalidate(&self, pattern: &str) -> Result<usize> {
        if pattern::is_match_all(pattern) {
            return Ok(self.clear_all());
        }

        let now = current_timestamp_ms();
        let mut removed: HashSet<String> = HashSet::new();
        {
            let mut entries = self.entries.lock();
            self.bump_generation();
            entries.retain(|key, entry| {
                if !pattern::matches(pattern, key) {
                    return true;
                }
                if !entry.is_expired_at(now) {
                    removed.insert(key.clone());
                }
                false
            });
        }

        for key in self.backend_keys() {
            if pattern::matches(pattern, &key) {
                self.backend_invalidate(Some(&key));
                removed.insert(key);
            }
        }

        Ok(removed.len())
    }

    // == Clear ==
    fn clear(&self) -> Result<()> {
        self.clear_all();
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(key) {
                return Ok(!entry.is_expired());
            }
        }
        Ok(self.load_persisted(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let now = current_timestamp_ms();
        let mut keys: BTreeSet<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.extend(self.backend_keys());
        Ok(keys.into_iter().collect())
    }

    // == Purge Expired ==
    fn purge_expired(&self) -> Result<usize> {
        let now = current_timestamp_ms();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired_at(now));
        Ok(before - entries.len())
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn has_persistence(&self) -> bool {
        self.backend.is_some()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::FileBackend;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::sync::{OnceLock, Weak};
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn store() -> MemoryStore {
        MemoryStore::new(100, 1_000)
    }

    #[derive(Debug)]
    struct BrokenBackend;

    impl PersistentBackend for BrokenBackend {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(CacheError::Backend("disk on fire".to_string()))
        }
        fn set(&self, _key: &str, _value: &[u8], _ttl_secs: u64) -> Result<()> {
            Err(CacheError::Backend("disk on fire".to_string()))
        }
        fn invalidate(&self, _key: Option<&str>) -> Result<()> {
            Err(CacheError::Backend("disk on fire".to_string()))
        }
        fn list_keys(&self) -> Result<Vec<String>> {
            Err(CacheError::Backend("disk on fire".to_string()))
        }
    }

    #[test]
    fn test_store_set_and_get() {
        let store = store();
        store.set("user:list", json!(["u1", "u2"]), TTL).unwrap();

        assert_eq!(store.get("user:list").unwrap(), Some(json!(["u1", "u2"])));
        assert_eq!(store.len(), 1);
        assert!(store.exists("user:list").unwrap());
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = store();
        assert_eq!(store.get("nonexistent").unwrap(), None);
        assert!(!store.exists("nonexistent").unwrap());
    }

    #[test]
    fn test_store_overwrite() {
        let store = store();
        store.set("k", json!(1), TTL).unwrap();
        store.set("k", json!(2), TTL).unwrap();

        assert_eq!(store.get("k").unwrap(), Some(json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_delete() {
        let store = store();
        store.set("k", json!(1), TTL).unwrap();

        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_ttl_expiration_removes_on_read() {
        let store = store();
        store.set("k", json!("v"), Duration::from_millis(50)).unwrap();
        assert!(store.get("k").unwrap().is_some());

        sleep(Duration::from_millis(80));

        assert_eq!(store.len(), 1, "expired entry still physically present");
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.len(), 0, "read removed the expired entry");
    }

    #[test]
    fn test_store_purge_expired() {
        let store = store();
        store.set("short", json!(1), Duration::from_millis(50)).unwrap();
        store.set("long", json!(2), TTL).unwrap();

        sleep(Duration::from_millis(80));

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys().unwrap(), vec!["long"]);
    }

    #[test]
    fn test_store_write_triggered_sweep() {
        let store = MemoryStore::new(100, 3);
        store.set("a", json!(1), Duration::from_millis(20)).unwrap();
        store.set("b", json!(1), Duration::from_millis(20)).unwrap();

        sleep(Duration::from_millis(40));

        // Third write triggers the sweep
        store.set("c", json!(1), TTL).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_capacity_evicts_closest_to_expiry() {
        let store = MemoryStore::new(3, 1_000);
        store.set("soon", json!(1), Duration::from_secs(10)).unwrap();
        store.set("mid", json!(2), Duration::from_secs(100)).unwrap();
        store.set("late", json!(3), Duration::from_secs(1_000)).unwrap();

        store.set("new", json!(4), Duration::from_secs(500)).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.evictions(), 1);
        assert!(store.get("soon").unwrap().is_none());
        assert!(store.get("mid").unwrap().is_some());
    }

    #[test]
    fn test_store_invalidate_pattern() {
        let store = store();
        store.set("user:list", json!(1), TTL).unwrap();
        store.set("user:describe:u1", json!(2), TTL).unwrap();
        store.set("group:list", json!(3), TTL).unwrap();
        store.set("group:describe:g1", json!(4), TTL).unwrap();

        assert_eq!(store.invalidate("user:*").unwrap(), 2);
        assert_eq!(store.keys().unwrap(), vec!["group:describe:g1", "group:list"]);
        assert_eq!(store.invalidate("user:*").unwrap(), 0);
    }

    #[test]
    fn test_store_invalidate_star_clears_everything() {
        let store = store();
        store.set("user:list", json!(1), TTL).unwrap();
        store.set("group:list", json!(2), TTL).unwrap();

        assert_eq!(store.invalidate("*").unwrap(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_backend_mirror_and_rehydrate() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn PersistentBackend> = Arc::new(FileBackend::new(dir.path()).unwrap());

        let first = MemoryStore::new(100, 1_000).with_backend(backend.clone());
        first.set("user:list", json!(["u1"]), TTL).unwrap();
        assert!(first.has_persistence());

        // A fresh process sees the persisted entry
        let second = MemoryStore::new(100, 1_000).with_backend(backend.clone());
        assert_eq!(second.len(), 0);
        assert_eq!(second.get("user:list").unwrap(), Some(json!(["u1"])));
        assert_eq!(second.len(), 1);
        assert_eq!(second.keys().unwrap(), vec!["user:list"]);
    }

    #[test]
    fn test_store_invalidate_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn PersistentBackend> = Arc::new(FileBackend::new(dir.path()).unwrap());

        let first = MemoryStore::new(100, 1_000).with_backend(backend.clone());
        first.set("user:list", json!(1), TTL).unwrap();
        first.set("group:list", json!(2), TTL).unwrap();

        let second = MemoryStore::new(100, 1_000).with_backend(backend.clone());
        assert_eq!(second.invalidate("user:*").unwrap(), 1);
        assert_eq!(backend.list_keys().unwrap(), vec!["group:list"]);

        assert_eq!(second.invalidate("*").unwrap(), 1);
        assert!(backend.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_store_backend_failures_are_not_errors() {
        let store = MemoryStore::new(100, 1_000).with_backend(Arc::new(BrokenBackend));

        store.set("k", json!(1), TTL).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!(1)));
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.invalidate("k*").unwrap(), 1);
        store.clear().unwrap();
        assert_eq!(store.keys().unwrap(), Vec::<String>::new());
    }

    /// File backend that runs `invalidate("user:*")` on its store in the
    /// middle of the next `get` or `set`.
    #[derive(Debug)]
    struct InterleavingBackend {
        inner: FileBackend,
        store: OnceLock<Weak<MemoryStore>>,
        armed: AtomicBool,
    }

    impl InterleavingBackend {
        fn new(dir: &std::path::Path) -> Self {
            Self {
                inner: FileBackend::new(dir).unwrap(),
                store: OnceLock::new(),
                armed: AtomicBool::new(false),
            }
        }

        fn attach(self: &Arc<Self>) -> Arc<MemoryStore> {
            let store = Arc::new(MemoryStore::new(100, 1_000).with_backend(self.clone()));
            self.store.set(Arc::downgrade(&store)).unwrap();
            self.armed.store(true, Ordering::SeqCst);
            store
        }

        fn interleave(&self) {
            if !self.armed.swap(false, Ordering::SeqCst) {
                return;
            }
            if let Some(store) = self.store.get().and_then(Weak::upgrade) {
                store.invalidate("user:*").unwrap();
            }
        }
    }

    impl PersistentBackend for InterleavingBackend {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let bytes = self.inner.get(key)?;
            self.interleave();
            Ok(bytes)
        }
        fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()> {
            self.interleave();
            self.inner.set(key, value, ttl_secs)
        }
        fn invalidate(&self, key: Option<&str>) -> Result<()> {
            self.inner.invalidate(key)
        }
        fn list_keys(&self) -> Result<Vec<String>> {
            self.inner.list_keys()
        }
    }

    #[test]
    fn test_store_invalidate_during_persist_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InterleavingBackend::new(dir.path()));
        let store = backend.attach();

        store.set("user:describe:u1", json!({"UserId": "u1"}), TTL).unwrap();

        assert!(backend.list_keys().unwrap().is_empty());
        assert_eq!(store.get("user:describe:u1").unwrap(), None);
    }

    #[test]
    fn test_store_invalidate_during_read_through_is_not_rehydrated() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MemoryStore::new(100, 1_000)
            .with_backend(Arc::new(FileBackend::new(dir.path()).unwrap()));
        writer.set("user:describe:u1", json!({"UserId": "u1"}), TTL).unwrap();

        let backend = Arc::new(InterleavingBackend::new(dir.path()));
        let store = backend.attach();

        assert_eq!(store.get("user:describe:u1").unwrap(), None);
        assert!(store.is_empty());
        assert!(backend.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_store_concurrent_access() {
        let store = Arc::new(MemoryStore::new(1_000, 1_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let key = format!("user:describe:{}-{}", t, i);
                        store.set(&key, json!(i), TTL).unwrap();
                        assert_eq!(store.get(&key).unwrap(), Some(json!(i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
        assert_eq!(store.invalidate("user:describe:*").unwrap(), 400);
    }
}
