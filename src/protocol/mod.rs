//! Wire Protocol Implementation
//!
//! Text-based, CRLF-terminated request/response protocol compatible with
//! common key-value client libraries.
//!
//! ## Modules
//!
//! - `frame`: incremental decoder for incoming command frames
//! - `reply`: response types and their wire serialization
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{decode, Reply};
//!
//! // Decoding an incoming request
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (frame, consumed) = decode(data).unwrap().unwrap();
//! assert_eq!(frame.args, vec!["GET", "name"]);
//! assert_eq!(consumed, data.len());
//!
//! // Creating a response
//! let reply = Reply::bulk("Ariz");
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod frame;
pub mod reply;

// Re-export commonly used types for convenience
pub use frame::{decode, DecodeResult, Frame, FrameError};
pub use reply::Reply;
