//! # EmberKV - A Lightweight In-Memory Key-Value Store Server
//!
//! EmberKV is an in-memory key-value store exposed over a textual wire
//! protocol compatible with common key-value client libraries. Storage is
//! a stack of composable layers, so expiration and durability are opt-in
//! wrappers rather than baked into the engine.
//!
//! ## Features
//!
//! - **Wire Compatible**: array-of-bulk-strings requests, standard
//!   status/integer/bulk/nil/array replies
//! - **Layered Storage**: base mapping, TTL overlay, snapshot-persistence
//!   overlay, composable in any combination
//! - **Lazy Expiration**: expired keys are deleted on access, no sweeper
//! - **Async I/O**: built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                            EmberKV                             │
//! │                                                                │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐         │
//! │  │   Server    │───>│ Connection  │───>│  Command    │         │
//! │  │ (Listener)  │    │  Session    │    │  Handler    │         │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘         │
//! │                                               │                │
//! │  ┌─────────────┐    ┌─────────────────────────▼─────────────┐  │
//! │  │   Frame     │    │            Store stack                │  │
//! │  │   Decoder   │    │  ┌─────────────────────────────────┐  │  │
//! │  │             │    │  │ PersistentStore   (optional)    │  │  │
//! │  └─────────────┘    │  │ ExpiryStore       (optional)    │  │  │
//! │                     │  │ MemoryStore                     │  │  │
//! │                     │  └─────────────────────────────────┘  │  │
//! │                     └───────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use emberkv::server::{Server, ServerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new(ServerConfig {
//!         host: "127.0.0.1".to_string(),
//!         port: 6379,
//!         default_ttl: Some(Duration::from_secs(3600)),
//!         persistence: Some("dump.json".into()),
//!     })?;
//!
//!     let addr = server.start().await?;
//!     println!("listening on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` - upsert an entry
//! - `GET key` - fetch an entry (nil when absent or expired)
//! - `DEL key [key ...]` - remove keys, reply is the count removed
//! - `EXISTS key [key ...]` - count present keys, one per occurrence
//! - `KEYS pattern` - glob-match live keys (`*`, `?`, `[...]`)
//! - `FLUSHDB` / `FLUSHALL` - clear everything (single logical database)
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame decoder and reply serialization
//! - [`storage`]: the `Store` trait and its three layers
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client session loop
//! - [`server`]: lifecycle (start / stop / drain)

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionError, ConnectionStats};
pub use protocol::{Frame, FrameError, Reply};
pub use server::{Server, ServerConfig, ServerError};
pub use storage::{ExpiryStore, MemoryStore, PersistentStore, Snapshot, Store, StoreError};

/// The default port EmberKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
