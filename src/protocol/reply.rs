//! Wire Reply Types
//!
//! This module defines the response types the server writes back to clients
//! and their wire encoding. All replies are CRLF-terminated:
//!
//! Simple status: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk string: `$5\r\nhello\r\n`
//! Nil: `$-1\r\n`
//! Array: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`
//!
//! Arrays in this protocol carry bulk strings only (the KEYS reply), so
//! `Reply::Array` holds plain strings rather than nested replies.

use std::fmt;

/// The CRLF terminator used on every wire line
pub const CRLF: &[u8] = b"\r\n";

/// Wire type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A response to be serialized onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Non-binary status line, e.g. `+OK\r\n`
    Simple(String),

    /// Error line, e.g. `-ERR unknown command\r\n`
    Error(String),

    /// 64-bit signed integer, e.g. `:3\r\n`
    Integer(i64),

    /// Length-prefixed text payload, e.g. `$5\r\nhello\r\n`
    Bulk(String),

    /// The nil marker for absent keys: `$-1\r\n`
    Nil,

    /// An array of bulk strings, e.g. the KEYS reply
    Array(Vec<String>),
}

impl Reply {
    /// The standard success status.
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    /// Creates an error reply.
    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// Creates an integer reply.
    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a bulk string reply.
    pub fn bulk(s: impl Into<String>) -> Self {
        Reply::Bulk(s.into())
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// This is more efficient than `serialize()` when reusing a buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Simple(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(s) => {
                write_bulk(buf, s);
            }
            Reply::Nil => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Array(items) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    write_bulk(buf, item);
                }
            }
        }
    }
}

fn write_bulk(buf: &mut Vec<u8>, s: &str) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(s.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(s.as_bytes());
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Simple(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(s) => write!(f, "\"{}\"", s),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(items) => {
                if items.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        write!(f, "{}) \"{}\"", i + 1, item)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
