//! Persistence Overlay
//!
//! Wraps an inner store (base or expiry-wrapped) and mirrors its full
//! observable state to a snapshot file after every mutation. The write is
//! synchronous and whole-file: by the time a mutating operation returns,
//! the file reflects the new state. Every mutation therefore pays a full
//! serialization cost, a deliberate trade of throughput for simplicity.
//!
//! At construction the snapshot file, if present, is parsed and loaded
//! into the inner store. A missing file means a fresh start; a file that
//! exists but does not parse is a fatal construction error, since the
//! store cannot guarantee its starting state.
//!
//! Reads never touch the file, even when the inner expiry layer lazily
//! deletes an entry; the next mutation persists the cleanup.

use crate::storage::store::{Snapshot, Store, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// A store overlay that snapshots the wrapped store to disk after every
/// mutating operation and restores from disk at construction.
///
/// # Example
///
/// ```no_run
/// use emberkv::storage::{MemoryStore, PersistentStore, Store};
///
/// let mut store = PersistentStore::new(MemoryStore::new(), "dump.json").unwrap();
/// store.set("name".into(), "Ariz".into()).unwrap();
/// // "dump.json" now holds {"data":{"name":"Ariz"}}
/// ```
#[derive(Debug)]
pub struct PersistentStore<S> {
    inner: S,
    path: PathBuf,
}

impl<S: Store> PersistentStore<S> {
    /// Wraps `inner`, loading prior state from `path` when it exists.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn new(inner: S, path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut store = Self {
            inner,
            path: path.into(),
        };

        if store.path.exists() {
            let raw = fs::read_to_string(&store.path).map_err(StoreError::SnapshotRead)?;
            let snapshot: Snapshot =
                serde_json::from_str(&raw).map_err(StoreError::CorruptSnapshot)?;
            let entries = snapshot.data.len();
            store.inner.restore(snapshot);
            info!(path = %store.path.display(), entries, "Restored snapshot");
        } else {
            debug!(path = %store.path.display(), "No snapshot file, starting empty");
        }

        Ok(store)
    }

    /// The snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the wrapped store's state and replaces the file contents.
    fn save(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot();
        let raw = serde_json::to_string(&snapshot).map_err(StoreError::SnapshotEncode)?;
        fs::write(&self.path, raw).map_err(StoreError::SnapshotWrite)?;
        trace!(path = %self.path.display(), entries = snapshot.data.len(), "Snapshot written");
        Ok(())
    }
}

impl<S: Store> Store for PersistentStore<S> {
    fn set(&mut self, key: String, value: String) -> Result<(), StoreError> {
        self.inner.set(key, value)?;
        self.save()
    }

    fn get(&mut self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn delete(&mut self, keys: &[String]) -> Result<usize, StoreError> {
        let removed = self.inner.delete(keys)?;
        self.save()?;
        Ok(removed)
    }

    fn exists(&mut self, keys: &[String]) -> usize {
        self.inner.exists(keys)
    }

    fn keys(&mut self, pattern: &str) -> Vec<String> {
        self.inner.keys(pattern)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.inner.clear()?;
        self.save()
    }

    fn snapshot(&self) -> Snapshot {
        self.inner.snapshot()
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.inner.restore(snapshot);
    }
}
