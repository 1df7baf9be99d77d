//! Layered Storage Engine
//!
//! Storage is a stack of composable layers that all implement the same
//! [`Store`] trait:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ PersistentStore   snapshot file per mutation  │  (optional)
//! ├───────────────────────────────────────────────┤
//! │ ExpiryStore       per-key TTL, lazy deletion  │  (optional)
//! ├───────────────────────────────────────────────┤
//! │ MemoryStore       key -> value mapping        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Each wrapper owns the next inner store and delegates the operations it
//! does not refine, so any combination is constructible.
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::{ExpiryStore, MemoryStore, Store};
//! use std::time::Duration;
//!
//! let mut store = ExpiryStore::new(MemoryStore::new(), Duration::from_secs(3600));
//! store.set("session".into(), "token123".into()).unwrap();
//! assert_eq!(store.get("session"), Some("token123".to_string()));
//! ```

pub mod expiry;
pub mod persist;
pub mod store;

// Re-export commonly used types
pub use expiry::ExpiryStore;
pub use persist::PersistentStore;
pub use store::{MemoryStore, Snapshot, Store, StoreError};

use std::sync::{Arc, Mutex};

/// A store stack shared across connections.
///
/// A single mutex rather than a reader-writer split: even GET can mutate
/// (lazy expiry deletes on read), and holding the lock across a mutation
/// keeps the snapshot write consistent with the state it captured.
pub type SharedStore = Arc<Mutex<Box<dyn Store>>>;

/// Wraps a store stack for sharing across connection tasks.
pub fn shared(store: impl Store + 'static) -> SharedStore {
    let boxed: Box<dyn Store> = Box::new(store);
    Arc::new(Mutex::new(boxed))
}
