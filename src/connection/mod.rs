//! Connection Module
//!
//! A `Connection` exclusively owns one byte stream to a single peer and
//! exchanges newline-delimited messages over it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Connection                             │
//! │                                                             │
//! │  write_bytes ──> BufWriter ──> write_all + flush ──> socket │
//! │                                                             │
//! │  read_line  <── LineFramer <── BytesMut <── read_buf  <──   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Buffered Reads**: Chunked socket reads, byte-exact line extraction
//! - **Complete Writes**: Short writes retried until the payload is out
//! - **Timeouts**: Optional limits on connect, read and write
//! - **Deterministic Close**: `close` flushes and shuts down the stream
//! - **Statistics**: Per-connection traffic counters
//!
//! ## Example
//!
//! ```ignore
//! use linewire::connection::{Connection, ConnectionConfig};
//!
//! let mut conn = Connection::connect("127.0.0.1", 5678, ConnectionConfig::default()).await?;
//! conn.write_message("test\n").await?;
//! let reply = conn.read_line().await?;
//! println!("Message received : {}", reply);
//! conn.close().await?;
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    Connection, ConnectionConfig, ConnectionError, ConnectionResult, ConnectionStats, Operation,
};
