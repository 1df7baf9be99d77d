//! Incremental Command Frame Decoder
//!
//! This module decodes client request frames from an incoming byte stream.
//! A request frame is an array header followed by one bulk string per
//! argument, the first argument being the command name:
//!
//! ```text
//! *<n>\r\n $<len>\r\n<len bytes>\r\n  ... (n times)
//! ```
//!
//! ## How the Decoder Works
//!
//! The decoder reads from a buffer and returns either:
//! - `Ok(Some((frame, consumed)))` - Successfully decoded a frame, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(FrameError)` - Invalid protocol data
//!
//! This design allows the caller to:
//! 1. Append incoming network data to a buffer
//! 2. Call `decode()` to attempt decoding
//! 3. If successful, advance the buffer by `consumed` bytes
//! 4. If incomplete, wait for more data
//! 5. If error, report it to the client and disconnect
//!
//! An array header with a count of zero decodes into an *empty frame*.
//! That is a well-formed request (answered with an "empty command" error
//! reply), not a protocol violation, so it does not cost the connection.

use crate::protocol::reply::{prefix, CRLF};
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that make the byte stream unrecoverable for this connection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    /// The request header did not start with the array marker
    #[error("expected array header, got {0:#04x}")]
    ExpectedArray(u8),

    /// An argument header did not start with the bulk-string marker
    #[error("expected bulk string header, got {0:#04x}")]
    ExpectedBulk(u8),

    /// Invalid integer in an array or bulk length header
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Negative argument count or bulk length
    #[error("negative length: {0}")]
    NegativeLength(i64),

    /// An argument was not valid UTF-8 text
    #[error("invalid UTF-8 in argument: {0}")]
    InvalidUtf8(String),

    /// Missing CRLF after a bulk payload
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// The frame exceeds maximum allowed size
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The frame declares more arguments than allowed
    #[error("too many arguments: {0} (max: {1})")]
    TooManyArgs(usize, usize),
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, FrameError>;

/// Maximum size for a single argument payload (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one frame
pub const MAX_ARGS: usize = 1024;

/// One fully-decoded client request: the command name plus its arguments,
/// in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Ordered arguments; `args[0]` is the command name when non-empty
    pub args: Vec<String>,
}

impl Frame {
    /// Returns true if the client sent a zero-argument array.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Attempts to decode one command frame from the buffer.
///
/// # Returns
///
/// - `Ok(Some((frame, consumed)))` - Successfully decoded a frame
/// - `Ok(None)` - Incomplete data, need more bytes
/// - `Err(e)` - Protocol violation
pub fn decode(buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != prefix::ARRAY {
        return Err(FrameError::ExpectedArray(buf[0]));
    }

    let (count, mut consumed) = match read_length(&buf[1..])? {
        Some((n, line_len)) => (n, 1 + line_len),
        None => return Ok(None),
    };

    if count < 0 {
        return Err(FrameError::NegativeLength(count));
    }
    let count = count as usize;
    if count > MAX_ARGS {
        return Err(FrameError::TooManyArgs(count, MAX_ARGS));
    }

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        match decode_bulk(&buf[consumed..])? {
            Some((arg, used)) => {
                args.push(arg);
                consumed += used;
            }
            None => return Ok(None), // Incomplete
        }
    }

    Ok(Some((Frame { args }, consumed)))
}

/// Decodes one argument: `$<len>\r\n<len bytes>\r\n`.
fn decode_bulk(buf: &[u8]) -> DecodeResult<Option<(String, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != prefix::BULK_STRING {
        return Err(FrameError::ExpectedBulk(buf[0]));
    }

    let (len, header_len) = match read_length(&buf[1..])? {
        Some((n, line_len)) => (n, 1 + line_len),
        None => return Ok(None),
    };

    if len < 0 {
        return Err(FrameError::NegativeLength(len));
    }
    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header_len + len + 2; // payload + CRLF
    if buf.len() < total {
        return Ok(None); // Incomplete
    }

    if &buf[header_len + len..total] != CRLF {
        return Err(FrameError::MissingCrlf);
    }

    let arg = std::str::from_utf8(&buf[header_len..header_len + len])
        .map_err(|e| FrameError::InvalidUtf8(e.to_string()))?
        .to_string();

    Ok(Some((arg, total)))
}

/// Reads a decimal length line terminated by CRLF.
///
/// Returns the parsed value and the number of bytes the line occupied
/// (digits plus terminator), or `None` if the line is not complete yet.
fn read_length(buf: &[u8]) -> DecodeResult<Option<(i64, usize)>> {
    let pos = match find_crlf(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let s = std::str::from_utf8(&buf[..pos])
        .map_err(|e| FrameError::InvalidLength(e.to_string()))?;
    let n: i64 = s
        .trim()
        .parse()
        .map_err(|e: ParseIntError| FrameError::InvalidLength(e.to_string()))?;

    Ok(Some((n, pos + 2)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    for i in 0..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(frame: &Frame) -> Vec<&str> {
        frame.args.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn test_decode_get() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (frame, consumed) = decode(input).unwrap().unwrap();
        assert_eq!(args(&frame), vec!["GET", "name"]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_decode_set() {
        let input = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n";
        let (frame, _) = decode(input).unwrap().unwrap();
        assert_eq!(args(&frame), vec!["SET", "user:101", "Ariz"]);
    }

    #[test]
    fn test_decode_incomplete_header() {
        assert!(decode(b"*2").unwrap().is_none());
        assert!(decode(b"*2\r\n$3\r\nGE").unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        // Bulk header declares 5 bytes but only 3 arrived so far
        assert!(decode(b"*1\r\n$5\r\nhel").unwrap().is_none());
    }

    #[test]
    fn test_decode_empty_command() {
        let (frame, consumed) = decode(b"*0\r\n").unwrap().unwrap();
        assert!(frame.is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_decode_empty_argument() {
        let (frame, _) = decode(b"*1\r\n$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(args(&frame), vec![""]);
    }

    #[test]
    fn test_reject_non_array_header() {
        let result = decode(b"+OK\r\n");
        assert!(matches!(result, Err(FrameError::ExpectedArray(b'+'))));
    }

    #[test]
    fn test_reject_non_bulk_argument() {
        let result = decode(b"*1\r\n:42\r\n");
        assert!(matches!(result, Err(FrameError::ExpectedBulk(b':'))));
    }

    #[test]
    fn test_reject_negative_count() {
        assert!(matches!(
            decode(b"*-1\r\n"),
            Err(FrameError::NegativeLength(-1))
        ));
        assert!(matches!(
            decode(b"*1\r\n$-1\r\n"),
            Err(FrameError::NegativeLength(-1))
        ));
    }

    #[test]
    fn test_reject_unparsable_count() {
        assert!(matches!(
            decode(b"*abc\r\n"),
            Err(FrameError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_reject_missing_trailing_crlf() {
        // Payload is followed by garbage instead of CRLF
        let result = decode(b"*1\r\n$3\r\nfooXX");
        assert!(matches!(result, Err(FrameError::MissingCrlf)));
    }

    #[test]
    fn test_reject_invalid_utf8() {
        let result = decode(b"*1\r\n$2\r\n\xff\xfe\r\n");
        assert!(matches!(result, Err(FrameError::InvalidUtf8(_))));
    }

    #[test]
    fn test_pipelined_frames_consume_one_at_a_time() {
        let input = b"*1\r\n$7\r\nFLUSHDB\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n";
        let (first, consumed) = decode(input).unwrap().unwrap();
        assert_eq!(args(&first), vec!["FLUSHDB"]);

        let (second, rest) = decode(&input[consumed..]).unwrap().unwrap();
        assert_eq!(args(&second), vec!["GET", "a"]);
        assert_eq!(consumed + rest, input.len());
    }

    #[test]
    fn test_reject_too_many_args() {
        let header = format!("*{}\r\n", MAX_ARGS + 1);
        assert!(matches!(
            decode(header.as_bytes()),
            Err(FrameError::TooManyArgs(_, _))
        ));
    }
}
