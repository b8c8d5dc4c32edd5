//! Client Module
//!
//! The request/reply client built on top of [`crate::connection`].
//!
//! ## Example
//!
//! ```ignore
//! use linewire::client::run_session;
//! use linewire::config::ClientConfig;
//!
//! let report = run_session(&ClientConfig::default()).await?;
//! println!("{} exchanges", report.state.exchanges);
//! ```

pub mod session;

pub use session::{drive, run_session, run_session_until, update, SessionReport, SessionState};
