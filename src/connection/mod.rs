//! Connection Session Management
//!
//! Each accepted client gets its own async task running a
//! decode-dispatch-respond loop over one TCP stream:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                     (server module)                         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Decode frame │───>│ Execute cmd │     │
//! │  └─────────────┘    └──────────────┘    └──────┬──────┘     │
//! │                                                ▼            │
//! │                                        ┌─────────────┐      │
//! │                                        │ Send reply  │      │
//! │                                        └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions are isolated: a protocol error or fault on one connection
//! never affects another connection or the listener.

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
