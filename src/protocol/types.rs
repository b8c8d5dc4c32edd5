//! Line Protocol Data Types
//!
//! The wire format is as small as a protocol gets: every message is an
//! opaque byte sequence followed by a single newline byte.
//!
//! ## Protocol Format
//!
//! ```text
//! <payload bytes...>\n
//! ```
//!
//! - No length prefix, no checksum, no escaping.
//! - The delimiter is not part of the logical message.
//! - A payload must not contain the delimiter itself.
//!
//! ## Examples
//!
//! `test\n` carries the message `test`.
//! `hello\nworld\n` carries two messages, `hello` and `world`.
//! `\n` carries one empty message.

use crate::protocol::framer::{ParseError, ParseResult};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The byte that terminates every message on the wire.
pub const DELIMITER: u8 = b'\n';

/// One complete message, delimiter stripped.
///
/// The payload is kept as raw bytes. Text decoding only happens on demand
/// through [`Message::to_text`], once the whole line has been assembled, so
/// multi-byte characters split across socket reads are never mangled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Message(Bytes);

impl Message {
    /// Wraps raw bytes as a message.
    ///
    /// # Example
    /// ```
    /// use linewire::protocol::Message;
    /// let msg = Message::new("test");
    /// assert_eq!(msg.as_bytes(), b"test");
    /// ```
    pub fn new(data: impl Into<Bytes>) -> Self {
        Message(data.into())
    }

    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the message, returning the payload.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the payload as UTF-8.
    pub fn to_text(&self) -> ParseResult<&str> {
        std::str::from_utf8(&self.0).map_err(|e| ParseError::InvalidUtf8(e.to_string()))
    }

    /// Builds the wire form of `payload`: the payload followed by exactly one
    /// delimiter.
    ///
    /// A single trailing delimiter already present in `payload` is accepted
    /// and not doubled. Any other delimiter inside the payload is rejected,
    /// since the peer would split the message there.
    ///
    /// # Example
    /// ```
    /// use linewire::protocol::Message;
    /// assert_eq!(&Message::framed("test").unwrap()[..], b"test\n");
    /// assert_eq!(&Message::framed("test\n").unwrap()[..], b"test\n");
    /// assert!(Message::framed("a\nb").is_err());
    /// ```
    pub fn framed(payload: impl AsRef<[u8]>) -> ParseResult<Bytes> {
        let payload = payload.as_ref();
        let body = payload.strip_suffix(&[DELIMITER]).unwrap_or(payload);

        if let Some(position) = body.iter().position(|&b| b == DELIMITER) {
            return Err(ParseError::EmbeddedDelimiter { position });
        }

        let mut out = BytesMut::with_capacity(body.len() + 1);
        out.put_slice(body);
        out.put_u8(DELIMITER);
        Ok(out.freeze())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&'static str> for Message {
    fn from(s: &'static str) -> Self {
        Message(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message(Bytes::from(v))
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Message(b)
    }
}
