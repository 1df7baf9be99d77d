//! Expiry Overlay
//!
//! Wraps an inner store and attaches an optional expiration deadline to
//! every key at SET time. Expiration is enforced lazily: the overlay
//! re-checks deadlines on every read and enumeration and deletes expired
//! entries on the spot. There is no background sweep; a key that is never
//! touched again is reclaimed the next time anything looks at it.
//!
//! Deadlines are wall-clock UNIX-epoch milliseconds rather than monotonic
//! instants, so they survive a snapshot/restore round trip.
//!
//! ## Per-key states
//!
//! ```text
//! absent ──SET──> live (expires at T)      when default_ttl > 0
//! absent ──SET──> live (no expiration)     when default_ttl == 0
//! live   ──read at/after T──> absent       lazy deletion
//! live   ──DEL / clear──> absent
//! ```

use crate::storage::store::{Snapshot, Store, StoreError};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in UNIX-epoch milliseconds.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A store overlay that expires entries a fixed duration after they are set.
///
/// # Example
///
/// ```
/// use emberkv::storage::{ExpiryStore, MemoryStore, Store};
/// use std::time::Duration;
///
/// // Duration::ZERO disables expiration entirely
/// let mut store = ExpiryStore::new(MemoryStore::new(), Duration::ZERO);
/// store.set("name".into(), "Ariz".into()).unwrap();
/// assert_eq!(store.get("name"), Some("Ariz".to_string()));
/// ```
#[derive(Debug)]
pub struct ExpiryStore<S> {
    inner: S,
    default_ttl: Duration,
    /// key -> deadline in epoch millis; `None` means the key never expires
    expiry: HashMap<String, Option<u64>>,
}

impl<S: Store> ExpiryStore<S> {
    /// Wraps `inner`, applying `default_ttl` to every subsequent SET.
    ///
    /// A zero duration means entries never expire.
    pub fn new(inner: S, default_ttl: Duration) -> Self {
        Self {
            inner,
            default_ttl,
            expiry: HashMap::new(),
        }
    }

    /// The default time-to-live applied at SET time.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Removes the key from the inner store if its deadline has passed.
    ///
    /// Returns true if the key was expired (and is now gone).
    fn expire_if_due(&mut self, key: &str) -> bool {
        let due = matches!(self.expiry.get(key), Some(Some(deadline)) if now_millis() >= *deadline);
        if due {
            self.expiry.remove(key);
            let _ = self.inner.delete(&[key.to_string()]);
        }
        due
    }

    /// Deletes every entry whose deadline has passed. Applied before
    /// enumeration so expired keys never reach pattern matching.
    fn purge_due(&mut self) {
        let now = now_millis();
        let due: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, deadline)| matches!(deadline, Some(t) if now >= *t))
            .map(|(k, _)| k.clone())
            .collect();

        for key in due {
            self.expiry.remove(&key);
            let _ = self.inner.delete(&[key.clone()]);
        }
    }
}

impl<S: Store> Store for ExpiryStore<S> {
    fn set(&mut self, key: String, value: String) -> Result<(), StoreError> {
        self.inner.set(key.clone(), value)?;
        let deadline = if self.default_ttl.is_zero() {
            None
        } else {
            Some(now_millis() + self.default_ttl.as_millis() as u64)
        };
        self.expiry.insert(key, deadline);
        Ok(())
    }

    fn get(&mut self, key: &str) -> Option<String> {
        if self.expire_if_due(key) {
            return None;
        }
        match self.inner.get(key) {
            Some(value) => Some(value),
            None => {
                // Record without a base entry is stale; drop it
                self.expiry.remove(key);
                None
            }
        }
    }

    fn delete(&mut self, keys: &[String]) -> Result<usize, StoreError> {
        // Expired keys are logically absent and must not count as removed
        for key in keys {
            self.expire_if_due(key);
        }
        let removed = self.inner.delete(keys)?;
        for key in keys {
            self.expiry.remove(key);
        }
        Ok(removed)
    }

    fn exists(&mut self, keys: &[String]) -> usize {
        for key in keys {
            self.expire_if_due(key);
        }
        self.inner.exists(keys)
    }

    fn keys(&mut self, pattern: &str) -> Vec<String> {
        self.purge_due();
        self.inner.keys(pattern)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.inner.clear()?;
        self.expiry.clear();
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        let mut snapshot = self.inner.snapshot();
        snapshot.expiry = Some(self.expiry.clone());
        snapshot
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let Snapshot { data, expiry } = snapshot;
        self.expiry = expiry.unwrap_or_default();
        self.inner.restore(Snapshot { data, expiry: None });
    }
}
