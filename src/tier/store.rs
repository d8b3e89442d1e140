//! Persistent tier storage
//!
//! `KeyValueStore` is the capability the pipeline consumes: get, set, remove
//! and enumerate string values by key, with an optional capacity probe.
//! `PersistentTier` layers stream namespaces and sequential indices on top of
//! it and refuses writes proactively once the probed capacity is reached.
//!
//! Two backends are bundled:
//! - `MemoryKvStore`: in-process, cloneable handle to shared state
//! - `FileKvStore`: one file per key, written atomically

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::Stream;
use crate::utils::{atomic_write, cleanup_temp_files};

use super::counter::KeyedCounter;
use super::error::{StoreError, StoreResult, TierError, TierResult};

/// A local key-value store with string keys and values
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removing an absent key is not an error
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Enumerate every stored key, in no particular order
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Maximum number of keys the store accepts, if known
    fn capacity(&self) -> Option<usize> {
        None
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.keys()?.len())
    }
}

/// In-memory store; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    capacity: Option<usize>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects new keys once `capacity` keys exist
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Copy of every entry, sorted by key
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.lock().clone()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity {
            if !entries.contains_key(key) && entries.len() >= capacity {
                return Err(StoreError::Full { capacity });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.lock().len())
    }
}

const VALUE_EXTENSION: &str = "val";

/// Directory-backed store: each key is one `<key>.val` file
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
    capacity: Option<usize>,
}

impl FileKvStore {
    /// Open (creating if needed) a store rooted at `dir`
    ///
    /// Temp files left by interrupted writes are removed.
    pub fn open<P: AsRef<Path>>(dir: P) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let cleaned = cleanup_temp_files(&dir)?;
        if cleaned > 0 {
            tracing::warn!(dir = %dir.display(), cleaned, "removed interrupted store writes");
        }

        Ok(Self { dir, capacity: None })
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(StoreError::Backend(format!("invalid key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.{}", key, VALUE_EXTENSION)))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        if let Some(capacity) = self.capacity {
            if !path.exists() && self.len()? >= capacity {
                return Err(StoreError::Full { capacity });
            }
        }
        atomic_write(&path, value.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        Ok(keys)
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

/// Stream-namespaced, index-addressed view over a `KeyValueStore`
pub struct PersistentTier<S> {
    store: S,
}

impl<S: KeyValueStore> PersistentTier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying backend
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The per-stream counters kept in this tier
    pub fn counter(&self) -> KeyedCounter<'_, S> {
        KeyedCounter::new(&self.store)
    }

    /// Store `value` at `<namespace>-<index>`
    ///
    /// Fails with `StoreFull` before touching the backend when the capacity
    /// probe says a new key would not fit.
    pub fn set(&self, stream: Stream, index: u64, value: &str) -> TierResult<()> {
        let key = stream.entry_key(index);

        if let Some(capacity) = self.store.capacity() {
            let exists = self.read(&key)?.is_some();
            let len = self.store.len().map_err(|source| TierError::StoreRead {
                key: key.clone(),
                source,
            })?;
            if !exists && len >= capacity {
                return Err(TierError::StoreFull { key, capacity });
            }
        }

        self.store
            .set(&key, value)
            .map_err(|source| TierError::StoreWrite { key, source })
    }

    pub fn get(&self, stream: Stream, index: u64) -> TierResult<Option<String>> {
        self.read(&stream.entry_key(index))
    }

    /// Like `get`, but a missing entry is a `MissingEntry` fault
    pub fn require(&self, stream: Stream, index: u64) -> TierResult<String> {
        let key = stream.entry_key(index);
        self.read(&key)?.ok_or(TierError::MissingEntry { key })
    }

    pub fn remove(&self, stream: Stream, index: u64) -> TierResult<()> {
        let key = stream.entry_key(index);
        self.store
            .remove(&key)
            .map_err(|source| TierError::StoreWrite { key, source })
    }

    /// Indices currently stored for `stream`, ascending
    pub fn indices(&self, stream: Stream) -> TierResult<Vec<u64>> {
        let keys = self.store.keys().map_err(|source| TierError::StoreRead {
            key: format!("{}-*", stream.namespace()),
            source,
        })?;
        let mut indices: Vec<u64> = keys
            .iter()
            .filter_map(|k| stream.parse_entry_key(k))
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    fn read(&self, key: &str) -> TierResult<Option<String>> {
        self.store.get(key).map_err(|source| TierError::StoreRead {
            key: key.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_shares_entries_between_clones() {
        let store = MemoryKvStore::new();
        let handle = store.clone();

        store.set("event-0", "a").unwrap();

        assert_eq!(handle.get("event-0").unwrap().as_deref(), Some("a"));
        assert_eq!(handle.len().unwrap(), 1);
    }

    #[test]
    fn test_memory_store_capacity() {
        let store = MemoryKvStore::with_capacity(1);
        store.set("a", "1").unwrap();
        // Overwriting an existing key does not need room
        store.set("a", "2").unwrap();

        let err = store.set("b", "1").unwrap_err();
        assert!(matches!(err, StoreError::Full { capacity: 1 }));
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKvStore::open(temp_dir.path().join("tier")).unwrap();

        store.set("ts-0", r#"{"value":[]}"#).unwrap();
        store.set("tsValCount", "1").unwrap();

        assert_eq!(store.get("ts-0").unwrap().as_deref(), Some(r#"{"value":[]}"#));
        assert_eq!(store.get("ts-1").unwrap(), None);

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ts-0".to_string(), "tsValCount".to_string()]);

        store.remove("ts-0").unwrap();
        store.remove("ts-0").unwrap();
        assert_eq!(store.get("ts-0").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("tier");

        FileKvStore::open(&dir).unwrap().set("event-0", "x").unwrap();
        fs::write(dir.join("event-1.tmp"), "partial").unwrap();

        let reopened = FileKvStore::open(&dir).unwrap();
        assert_eq!(reopened.get("event-0").unwrap().as_deref(), Some("x"));
        assert_eq!(reopened.keys().unwrap(), vec!["event-0".to_string()]);
    }

    #[test]
    fn test_file_store_rejects_path_like_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKvStore::open(temp_dir.path()).unwrap();
        assert!(store.set("../escape", "x").is_err());
    }

    #[test]
    fn test_tier_refuses_write_at_capacity() {
        let tier = PersistentTier::new(MemoryKvStore::with_capacity(2));
        tier.set(Stream::Events, 0, "a").unwrap();
        tier.set(Stream::Events, 1, "b").unwrap();

        let err = tier.set(Stream::Events, 2, "c").unwrap_err();
        assert!(matches!(err, TierError::StoreFull { ref key, capacity: 2 } if key == "event-2"));
        assert!(err.is_store_write());

        // Overwrite of an existing index still fits
        tier.set(Stream::Events, 1, "B").unwrap();
    }

    #[test]
    fn test_tier_require_reports_missing_entry() {
        let tier = PersistentTier::new(MemoryKvStore::new());
        let err = tier.require(Stream::TsVals, 3).unwrap_err();
        assert!(matches!(err, TierError::MissingEntry { ref key } if key == "ts-3"));
        assert!(err.is_store_read());
    }

    #[test]
    fn test_tier_indices_ignore_other_namespaces() {
        let tier = PersistentTier::new(MemoryKvStore::new());
        tier.set(Stream::TsVals, 1, "b").unwrap();
        tier.set(Stream::TsVals, 0, "a").unwrap();
        tier.set(Stream::Events, 5, "e").unwrap();
        tier.store().set("tsValCount", "2").unwrap();

        assert_eq!(tier.indices(Stream::TsVals).unwrap(), vec![0, 1]);
        assert_eq!(tier.indices(Stream::Events).unwrap(), vec![5]);
    }
}
