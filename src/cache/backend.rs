//! Persistent Backend Module
//!
//! Optional second tier that mirrors cache entries so a restarted process
//! starts warm. The store treats every backend failure as a miss or a
//! best-effort write; nothing here is allowed to fail a cache operation.

use std::fmt::Debug;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::error::{CacheError, Result};

/// File extension of persisted entries
const ENTRY_EXTENSION: &str = "entry";

// == Persistent Backend Trait ==
/// Byte-level key/value storage with TTLs.
pub trait PersistentBackend: Send + Sync + Debug {
    /// Returns the stored bytes, `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores bytes for `ttl_secs` seconds; `0` means no expiry.
    fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()>;

    /// Removes one key, or everything when `key` is `None`.
    fn invalidate(&self, key: Option<&str>) -> Result<()>;

    /// Keys currently held.
    fn list_keys(&self) -> Result<Vec<String>>;
}

// == File Backend ==
/// Stores one file per key in a directory.
///
/// File layout: a JSON header line carrying the key and expiry, then the raw
/// payload bytes. File names are the SHA-256 of the key, so arbitrary keys
/// map to safe names.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    key: String,
    /// Unix milliseconds, `None` for no expiry
    expires_at: Option<u64>,
}

impl FileHeader {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| now_ms > at)
    }
}

impl FileBackend {
    /// Opens (creating if needed) a backend rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            CacheError::Configuration(format!(
                "cannot create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.{}", name, ENTRY_EXTENSION))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn remove_file(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads only the header line of an entry file; `None` if the file is gone.
fn read_header(path: &Path) -> Result<Option<FileHeader>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut line = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut line)?;
    if line.pop() != Some(b'\n') {
        return Err(CacheError::Serialization("persisted entry has no header".to_string()));
    }
    Ok(Some(serde_json::from_slice(&line)?))
}

fn split_file(raw: &[u8]) -> Result<(FileHeader, &[u8])> {
    let newline = raw
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| CacheError::Serialization("persisted entry has no header".to_string()))?;
    let header: FileHeader = serde_json::from_slice(&raw[..newline])?;
    Ok((header, &raw[newline + 1..]))
}

impl PersistentBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (header, payload) = split_file(&raw)?;
        if header.key != key {
            warn!(key = %key, stored = %header.key, "Persisted entry key mismatch");
            return Ok(None);
        }
        if header.is_expired(current_timestamp_ms()) {
            debug!(key = %key, "Removing expired persisted entry");
            Self::remove_file(&path)?;
            return Ok(None);
        }
        Ok(Some(payload.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()> {
        let header = FileHeader {
            key: key.to_string(),
            expires_at: (ttl_secs > 0)
                .then(|| current_timestamp_ms().saturating_add(ttl_secs * 1000)),
        };
        let mut contents = serde_json::to_vec(&header)?;
        contents.push(b'\n');
        contents.extend_from_slice(value);

        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn invalidate(&self, key: Option<&str>) -> Result<()> {
        match key {
            Some(key) => Self::remove_file(&self.path_for(key)),
            None => {
                for path in self.entry_files()? {
                    Self::remove_file(&path)?;
                }
                Ok(())
            }
        }
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let now = current_timestamp_ms();
        let mut keys = Vec::new();
        for path in self.entry_files()? {
            match read_header(&path) {
                Ok(None) => {}
                Ok(Some(header)) if header.is_expired(now) => Self::remove_file(&path)?,
                Ok(Some(header)) => keys.push(header.key),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn backend() -> (tempfile::TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("cache")).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_set_get_roundtrip() {
        let (_dir, backend) = backend();
        backend.set("user:list", b"[\"u1\"]", 60).unwrap();

        assert_eq!(backend.get("user:list").unwrap(), Some(b"[\"u1\"]".to_vec()));
        assert_eq!(backend.get("group:list").unwrap(), None);
    }

    #[test]
    fn test_payload_may_contain_newlines() {
        let (_dir, backend) = backend();
        backend.set("k:list", b"line1\nline2", 0).unwrap();
        assert_eq!(backend.get("k:list").unwrap(), Some(b"line1\nline2".to_vec()));
    }

    #[test]
    fn test_list_keys_and_invalidate() {
        let (_dir, backend) = backend();
        backend.set("user:list", b"1", 60).unwrap();
        backend.set("group:list", b"2", 60).unwrap();

        assert_eq!(backend.list_keys().unwrap(), vec!["group:list", "user:list"]);

        backend.invalidate(Some("user:list")).unwrap();
        assert_eq!(backend.list_keys().unwrap(), vec!["group:list"]);

        backend.invalidate(Some("missing:key")).unwrap();

        backend.invalidate(None).unwrap();
        assert!(backend.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_expired_entries_are_removed() {
        let (_dir, backend) = backend();
        backend.set("user:list", b"1", 1).unwrap();
        assert!(backend.get("user:list").unwrap().is_some());

        sleep(Duration::from_millis(1100));

        assert!(backend.get("user:list").unwrap().is_none());
        assert!(backend.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_listing_only_needs_the_header() {
        let (_dir, backend) = backend();
        let payload = vec![b'x'; 256 * 1024];
        backend.set("group:describe:g1", &payload, 60).unwrap();

        let header = read_header(&backend.path_for("group:describe:g1"))
            .unwrap()
            .unwrap();
        assert_eq!(header.key, "group:describe:g1");
        assert!(read_header(&backend.path_for("missing:key")).unwrap().is_none());
        assert_eq!(backend.list_keys().unwrap(), vec!["group:describe:g1"]);
    }

    #[test]
    fn test_corrupt_file_is_skipped_in_listing() {
        let (_dir, backend) = backend();
        backend.set("user:list", b"1", 60).unwrap();
        fs::write(backend.dir().join("garbage.entry"), b"no header").unwrap();

        assert_eq!(backend.list_keys().unwrap(), vec!["user:list"]);
    }
}
