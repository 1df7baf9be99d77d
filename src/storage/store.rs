//! Base Store: the operation-set interface and the in-memory mapping
//!
//! All storage layers implement the same [`Store`] trait, so any stack of
//! wrappers exposes the same operations to the command dispatcher:
//!
//! ```text
//! ┌──────────────────┐
//! │ PersistentStore  │  snapshot to disk after every mutation
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   ExpiryStore    │  per-key expiration, lazy deletion on access
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   MemoryStore    │  plain key -> value mapping
//! └──────────────────┘
//! ```
//!
//! Every combination (base only, expiry only, persistence over either) is
//! constructible; each wrapper owns the next inner store.
//!
//! Read-shaped operations take `&mut self` because the expiry layer deletes
//! expired entries on access. Mutating operations return `Result` because
//! the persistence layer can fail its snapshot write.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors surfaced by a storage layer.
///
/// The base mapping never fails; these come from the persistence overlay.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing the snapshot file failed
    #[error("snapshot write failed: {0}")]
    SnapshotWrite(#[source] std::io::Error),

    /// Reading the snapshot file failed
    #[error("snapshot read failed: {0}")]
    SnapshotRead(#[source] std::io::Error),

    /// The snapshot file exists but does not parse
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(#[source] serde_json::Error),

    /// Encoding the in-memory state failed
    #[error("snapshot encode failed: {0}")]
    SnapshotEncode(#[source] serde_json::Error),
}

/// The full observable state of a store stack, as persisted to disk.
///
/// `expiry` maps each key to its expiration deadline in UNIX-epoch
/// milliseconds; `None` inside the map means the key never expires. The
/// field is absent entirely when no expiry layer is in the stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The entry mapping
    pub data: HashMap<String, String>,

    /// The expiration-record mapping, keyed identically to `data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<HashMap<String, Option<u64>>>,
}

/// The operation set shared by the base mapping and every overlay.
pub trait Store: Send {
    /// Inserts or overwrites an entry.
    fn set(&mut self, key: String, value: String) -> Result<(), StoreError>;

    /// Fetches the value for a key, or `None` if absent (or expired).
    fn get(&mut self, key: &str) -> Option<String>;

    /// Removes the given keys, returning how many actually existed.
    fn delete(&mut self, keys: &[String]) -> Result<usize, StoreError>;

    /// Counts present keys, one per occurrence in the argument list
    /// (a repeated key that exists is counted each time it appears).
    fn exists(&mut self, keys: &[String]) -> usize;

    /// Returns all live keys matching a glob pattern.
    ///
    /// Supported wildcards: `*` (any run), `?` (one character),
    /// `[...]` (character class), `\` (escape).
    fn keys(&mut self, pattern: &str) -> Vec<String>;

    /// Removes every entry.
    fn clear(&mut self) -> Result<(), StoreError>;

    /// Captures the full observable state of this stack.
    fn snapshot(&self) -> Snapshot;

    /// Replaces this stack's state with a previously captured snapshot.
    fn restore(&mut self, snapshot: Snapshot);
}

/// The base layer: a plain in-memory mapping with no notion of time or
/// durability. All operations are total.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: HashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Store for MemoryStore {
    fn set(&mut self, key: String, value: String) -> Result<(), StoreError> {
        self.data.insert(key, value);
        Ok(())
    }

    fn get(&mut self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn delete(&mut self, keys: &[String]) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in keys {
            if self.data.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn exists(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|k| self.data.contains_key(*k)).count()
    }

    fn keys(&mut self, pattern: &str) -> Vec<String> {
        let pattern = GlobPattern::new(pattern);
        self.data
            .keys()
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect()
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.data.clear();
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            data: self.data.clone(),
            expiry: None,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.data = snapshot.data;
    }
}

/// Shell-style glob matcher for the KEYS command.
///
/// Supported patterns:
/// - `*` matches any run of characters
/// - `h?llo` matches hello and hallo, but not hllo
/// - `h[ae]llo` matches hello and hallo, but not hillo
pub(crate) struct GlobPattern {
    pattern: String,
}

impl GlobPattern {
    pub(crate) fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        self.matches_recursive(self.pattern.as_bytes(), text.as_bytes())
    }

    fn matches_recursive(&self, pattern: &[u8], text: &[u8]) -> bool {
        if pattern.is_empty() {
            return text.is_empty();
        }

        match pattern[0] {
            b'*' => {
                // Try matching zero or more characters
                for i in 0..=text.len() {
                    if self.matches_recursive(&pattern[1..], &text[i..]) {
                        return true;
                    }
                }
                false
            }
            b'?' => {
                // Match exactly one character
                !text.is_empty() && self.matches_recursive(&pattern[1..], &text[1..])
            }
            b'[' => {
                // Character class
                if text.is_empty() {
                    return false;
                }

                let mut i = 1;
                let mut matched = false;
                let negate = pattern.get(1) == Some(&b'^');
                if negate {
                    i += 1;
                }

                while i < pattern.len() && pattern[i] != b']' {
                    if pattern[i] == text[0] {
                        matched = true;
                    }
                    // Handle ranges like [a-z]
                    if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                        if text[0] >= pattern[i] && text[0] <= pattern[i + 2] {
                            matched = true;
                        }
                        i += 2;
                    }
                    i += 1;
                }

                if negate {
                    matched = !matched;
                }

                if i < pattern.len() {
                    matched && self.matches_recursive(&pattern[i + 1..], &text[1..])
                } else {
                    false
                }
            }
            b'\\' => {
                // Escape character
                if pattern.len() > 1 && !text.is_empty() && pattern[1] == text[0] {
                    self.matches_recursive(&pattern[2..], &text[1..])
                } else {
                    false
                }
            }
            c => {
                // Literal character
                !text.is_empty()
                    && c == text[0]
                    && self.matches_recursive(&pattern[1..], &text[1..])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_and_get() {
        let mut store = MemoryStore::new();
        store.set("key".into(), "value".into()).unwrap();
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_set_overwrites() {
        let mut store = MemoryStore::new();
        store.set("key".into(), "one".into()).unwrap();
        store.set("key".into(), "two".into()).unwrap();
        assert_eq!(store.get("key"), Some("two".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_delete_counts_removed() {
        let mut store = MemoryStore::new();
        store.set("a".into(), "1".into()).unwrap();
        store.set("b".into(), "2".into()).unwrap();

        let removed = store.delete(&keys(&["a", "b", "missing"])).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), None);
        assert_eq!(store.delete(&keys(&["a"])).unwrap(), 0);
    }

    #[test]
    fn test_exists_counts_occurrences() {
        let mut store = MemoryStore::new();
        store.set("a".into(), "1".into()).unwrap();
        store.set("b".into(), "2".into()).unwrap();

        assert_eq!(store.exists(&keys(&["a", "b", "c"])), 2);
        // A repeated existing key counts once per occurrence
        assert_eq!(store.exists(&keys(&["a", "a", "b"])), 3);
    }

    #[test]
    fn test_keys_pattern() {
        let mut store = MemoryStore::new();
        store.set("key1abc".into(), "a".into()).unwrap();
        store.set("key2abc".into(), "b".into()).unwrap();
        store.set("otherkey".into(), "c".into()).unwrap();

        let mut matched = store.keys("key*abc");
        matched.sort();
        assert_eq!(matched, vec!["key1abc", "key2abc"]);

        assert_eq!(store.keys("*").len(), 3);
        assert!(store.keys("nomatch*").is_empty());
    }

    #[test]
    fn test_clear() {
        let mut store = MemoryStore::new();
        store.set("a".into(), "1".into()).unwrap();
        store.set("b".into(), "2".into()).unwrap();

        store.clear().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.exists(&keys(&["a", "b"])), 0);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut store = MemoryStore::new();
        store.set("a".into(), "1".into()).unwrap();
        store.set("b".into(), "2".into()).unwrap();

        let snap = store.snapshot();
        assert!(snap.expiry.is_none());

        let mut other = MemoryStore::new();
        other.restore(snap);
        assert_eq!(other.get("a"), Some("1".to_string()));
        assert_eq!(other.get("b"), Some("2".to_string()));
        assert_eq!(other.len(), 2);
    }

    #[test]
    fn test_snapshot_serializes_without_expiry_field() {
        let mut store = MemoryStore::new();
        store.set("a".into(), "1".into()).unwrap();

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        assert!(!json.contains("expiry"));

        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data.get("a"), Some(&"1".to_string()));
    }

    #[test]
    fn test_glob_pattern() {
        let pattern = GlobPattern::new("h*llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(pattern.matches("hllo"));
        assert!(pattern.matches("heeeello"));
        assert!(!pattern.matches("world"));

        let pattern = GlobPattern::new("h?llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(!pattern.matches("hllo"));
        assert!(!pattern.matches("heello"));

        let pattern = GlobPattern::new("*");
        assert!(pattern.matches(""));
        assert!(pattern.matches("anything"));

        let pattern = GlobPattern::new("h[ae]llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(!pattern.matches("hillo"));
    }
}
