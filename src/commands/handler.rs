//! Command Dispatcher
//!
//! Maps a decoded frame to one of the fixed commands, validates arity,
//! runs the store operation, and produces the wire reply.
//!
//! ```text
//! Frame ──> CommandHandler ──> Store stack ──> Reply
//! ```
//!
//! Command names match case-insensitively. A name or arity that does not
//! match the table below gets a generic command error; the connection
//! stays open either way.
//!
//! | Command        | Arity | Reply                       |
//! |----------------|-------|-----------------------------|
//! | SET key value  | 3     | `+OK`                       |
//! | GET key        | 2     | bulk string or nil          |
//! | DEL key...     | >= 2  | integer: keys removed       |
//! | EXISTS key...  | >= 2  | integer: occurrences present|
//! | KEYS pattern   | 2     | array of bulk strings       |
//! | FLUSHDB        | 1     | `+OK`                       |
//! | FLUSHALL       | 1     | `+OK` (single database)     |

use crate::protocol::{Frame, Reply};
use crate::storage::{SharedStore, Store, StoreError};
use std::sync::{MutexGuard, PoisonError};
use tracing::warn;

/// Executes commands against the shared store stack.
///
/// Cheap to clone; each connection gets its own handle to the same store.
#[derive(Clone)]
pub struct CommandHandler {
    store: SharedStore,
}

impl CommandHandler {
    /// Creates a handler over the given store stack.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Executes one decoded frame and returns the reply to send back.
    pub fn execute(&self, frame: Frame) -> Reply {
        if frame.is_empty() {
            return Reply::error("ERR empty command");
        }

        let name = frame.args[0].to_uppercase();
        let args = &frame.args[1..];

        match (name.as_str(), args.len()) {
            ("SET", 2) => self.cmd_set(&args[0], &args[1]),
            ("GET", 1) => self.cmd_get(&args[0]),
            ("DEL", n) if n >= 1 => self.cmd_del(args),
            ("EXISTS", n) if n >= 1 => self.cmd_exists(args),
            ("KEYS", 1) => self.cmd_keys(&args[0]),
            // Single logical database: FLUSHALL clears the same state
            ("FLUSHDB", 0) | ("FLUSHALL", 0) => self.cmd_flush(),
            _ => Reply::error("ERR unknown command or wrong number of arguments"),
        }
    }

    /// Locks the shared store, recovering from poisoning so one panicked
    /// command cannot take every other connection down with it.
    fn store(&self) -> MutexGuard<'_, Box<dyn Store>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cmd_set(&self, key: &str, value: &str) -> Reply {
        match self.store().set(key.to_string(), value.to_string()) {
            Ok(()) => Reply::ok(),
            Err(e) => store_error(e),
        }
    }

    fn cmd_get(&self, key: &str) -> Reply {
        match self.store().get(key) {
            Some(value) => Reply::bulk(value),
            None => Reply::Nil,
        }
    }

    fn cmd_del(&self, keys: &[String]) -> Reply {
        match self.store().delete(keys) {
            Ok(removed) => Reply::integer(removed as i64),
            Err(e) => store_error(e),
        }
    }

    fn cmd_exists(&self, keys: &[String]) -> Reply {
        Reply::integer(self.store().exists(keys) as i64)
    }

    fn cmd_keys(&self, pattern: &str) -> Reply {
        Reply::Array(self.store().keys(pattern))
    }

    fn cmd_flush(&self) -> Reply {
        match self.store().clear() {
            Ok(()) => Reply::ok(),
            Err(e) => store_error(e),
        }
    }
}

/// A failed mutation keeps the connection alive: the in-memory state has
/// already changed, so the client is told rather than disconnected.
fn store_error(e: StoreError) -> Reply {
    warn!(error = %e, "Store operation failed");
    Reply::error(format!("ERR {}", e))
}
