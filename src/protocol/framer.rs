//! Newline Line Framer
//!
//! Turns a raw byte stream into discrete messages by scanning for the
//! delimiter byte. The framer never touches the socket itself; the connection
//! appends whatever the transport delivered to a buffer and asks the framer
//! whether a complete line is available yet.
//!
//! ## How the Framer Works
//!
//! Each call returns either:
//! - `Ok(Some(line))` - a complete line was found and removed from the buffer
//! - `Ok(None)` - no delimiter yet, read more data and try again
//! - `Err(ParseError)` - the pending line exceeds the configured maximum
//!
//! The result is byte-identical to reading the stream one byte at a time
//! and stopping at the first delimiter, but the transport is read in chunks.
//! Bytes following the delimiter stay in the buffer for the next call.
//!
//! The framer remembers how far it already scanned an incomplete buffer, so
//! a long line arriving in many small segments is scanned once, not once per
//! segment.

use crate::protocol::types::{Message, DELIMITER};
use bytes::BytesMut;
use thiserror::Error;

/// Errors produced while framing or decoding lines.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The pending line grew past the maximum without a delimiter
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },

    /// A complete line was not valid UTF-8 when decoded as text
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// A payload to be framed contains the delimiter
    #[error("payload contains a delimiter at byte {position}")]
    EmbeddedDelimiter { position: usize },
}

/// Result type for framing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Default maximum line length (64 KB), delimiter excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Incremental newline framer.
///
/// A framer tracks scan progress for one buffer; use one framer per buffer.
///
/// # Example
///
/// ```
/// use linewire::protocol::LineFramer;
/// use bytes::BytesMut;
///
/// let mut framer = LineFramer::new();
/// let mut buffer = BytesMut::from(&b"hello\nwor"[..]);
///
/// let line = framer.decode(&mut buffer).unwrap().unwrap();
/// assert_eq!(line.as_bytes(), b"hello");
///
/// // "wor" has no delimiter yet
/// assert!(framer.decode(&mut buffer).unwrap().is_none());
///
/// buffer.extend_from_slice(b"ld\n");
/// let line = framer.decode(&mut buffer).unwrap().unwrap();
/// assert_eq!(line.as_bytes(), b"world");
/// ```
#[derive(Debug, Clone)]
pub struct LineFramer {
    /// Longest accepted line
    max_line_length: usize,

    /// Bytes at the front of the buffer already known to hold no delimiter
    scanned: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Creates a framer with [`DEFAULT_MAX_LINE_LENGTH`].
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Creates a framer rejecting lines longer than `max_line_length` bytes.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            scanned: 0,
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Locates the next delimiter in `buf`.
    ///
    /// Returns the length of the line in front of it, or `None` if the buffer
    /// holds no complete line yet.
    pub fn find_line(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        let start = self.scanned.min(buf.len());

        match buf[start..].iter().position(|&b| b == DELIMITER) {
            Some(offset) => {
                let len = start + offset;
                self.scanned = 0;
                if len > self.max_line_length {
                    return Err(ParseError::LineTooLong {
                        size: len,
                        max: self.max_line_length,
                    });
                }
                Ok(Some(len))
            }
            None => {
                self.scanned = buf.len();
                if buf.len() > self.max_line_length {
                    return Err(ParseError::LineTooLong {
                        size: buf.len(),
                        max: self.max_line_length,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Removes the next complete line from `buf`.
    ///
    /// The delimiter is consumed and dropped. The returned message shares the
    /// buffer's allocation, no copy is made.
    pub fn decode(&mut self, buf: &mut BytesMut) -> ParseResult<Option<Message>> {
        match self.find_line(buf)? {
            Some(len) => {
                let mut line = buf.split_to(len + 1);
                line.truncate(len);
                Ok(Some(Message::new(line.freeze())))
            }
            None => Ok(None),
        }
    }
}

/// Convenience function to parse one line from a byte slice.
///
/// Returns the line and the number of bytes consumed (line plus delimiter).
///
/// # Example
///
/// ```
/// use linewire::protocol::parse_line;
///
/// let (line, consumed) = parse_line(b"test\nmore").unwrap().unwrap();
/// assert_eq!(line.as_bytes(), b"test");
/// assert_eq!(consumed, 5);
/// ```
pub fn parse_line(buf: &[u8]) -> ParseResult<Option<(Message, usize)>> {
    let mut framer = LineFramer::new();
    Ok(framer
        .find_line(buf)?
        .map(|len| (Message::from(buf[..len].to_vec()), len + 1)))
}
