//! Line Protocol Implementation
//!
//! Newline-delimited messages over a raw byte stream.
//!
//! ## Modules
//!
//! - `types`: The `Message` type and the wire delimiter
//! - `framer`: Incremental delimiter scanner over a receive buffer
//!
//! ## Example
//!
//! ```
//! use linewire::protocol::{parse_line, Message};
//!
//! // Building a delimited payload
//! let wire = Message::framed("test").unwrap();
//! assert_eq!(&wire[..], b"test\n");
//!
//! // Parsing it back
//! let (line, consumed) = parse_line(&wire).unwrap().unwrap();
//! assert_eq!(line.as_bytes(), b"test");
//! assert_eq!(consumed, 5);
//! ```

pub mod framer;
pub mod types;

// Re-export commonly used types for convenience
pub use framer::{parse_line, LineFramer, ParseError, ParseResult, DEFAULT_MAX_LINE_LENGTH};
pub use types::{Message, DELIMITER};
