//! # linewire - Newline-Delimited Messaging over TCP
//!
//! linewire frames messages on a raw byte stream with a single newline
//! delimiter, and ships a small request/reply client that sends a message to a peer
//! at a fixed interval and reads a reply after each send.
//!
//! ## Features
//!
//! - **Byte-Exact Framing**: Lines are extracted from raw bytes; text decoding
//!   happens only on complete lines
//! - **Buffered I/O**: Chunked reads, complete writes, no per-byte syscalls
//! - **Clear Failures**: Peer closing mid-line is an error, never a hang
//! - **Timeouts**: Optional connect, read and write limits
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          linewire                            │
//! │                                                              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐       │
//! │  │  Session    │───>│ Connection  │───>│ LineFramer  │       │
//! │  │  (client)   │    │  (buffer)   │    │ (protocol)  │       │
//! │  └──────┬──────┘    └──────┬──────┘    └─────────────┘       │
//! │         │                  │                                 │
//! │         ▼                  ▼                                 │
//! │  ┌─────────────┐    ┌─────────────┐                          │
//! │  │SessionState │    │  TcpStream  │                          │
//! │  └─────────────┘    └─────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linewire::connection::{Connection, ConnectionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut conn = Connection::connect("127.0.0.1", 5678, ConnectionConfig::default()).await?;
//!
//!     conn.write_message("test\n").await?;
//!     let reply = conn.read_line().await?;
//!     println!("Message received : {}", reply);
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Delimiter, message type and the incremental line framer
//! - [`connection`]: Buffered connection with `read_line` / `write_message`
//! - [`client`]: The request/reply session loop
//! - [`config`]: Client defaults and command-line parsing

pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;

// Re-export commonly used types for convenience
pub use client::{run_session, SessionReport, SessionState};
pub use config::{CliCommand, ClientConfig, ConfigError};
pub use connection::{Connection, ConnectionConfig, ConnectionError, ConnectionStats};
pub use protocol::{LineFramer, Message, ParseError, DELIMITER};

/// The default peer port
pub const DEFAULT_PORT: u16 = 5678;

/// The default peer host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of linewire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
