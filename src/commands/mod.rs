//! Command Processing Layer
//!
//! Receives decoded frames, executes them against the configured store
//! stack, and returns wire replies.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame Decoder  │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Store stack   │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
