//! Client Configuration
//!
//! Defaults plus command-line parsing for the request/reply client.
//!
//! ```text
//! linewire --ip 10.0.0.7 --port 5678 --count 5 --message ping
//! ```

use crate::connection::ConnectionConfig;
use crate::protocol::{Message, ParseError};
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Number of exchanges when `--count` is not given
pub const DEFAULT_ITERATIONS: u32 = 20;

/// Delay between exchanges when `--interval` is not given
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Payload sent when `--message` is not given
pub const DEFAULT_MESSAGE: &[u8] = b"test\n";

/// Everything the client session needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Peer host name or address
    pub host: String,

    /// Peer port
    pub port: u16,

    /// Number of send/reply exchanges
    pub iterations: u32,

    /// Pause after each exchange except the last
    pub interval: Duration,

    /// Wire form of the message, delimiter included
    pub message: Bytes,

    /// Wait for one reply line after every send
    pub expect_reply: bool,

    /// Timeouts and line limit for the connection
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            iterations: DEFAULT_ITERATIONS,
            interval: DEFAULT_INTERVAL,
            message: Bytes::from_static(DEFAULT_MESSAGE),
            expect_reply: true,
            connection: ConnectionConfig::default(),
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Run(ClientConfig),
    Help,
    Version,
}

/// Errors from command-line parsing.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] ParseError),
}

impl ClientConfig {
    /// Parses command-line arguments (program name already stripped).
    pub fn from_args<I>(args: I) -> Result<CliCommand, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = ClientConfig::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--ip" | "-i" => {
                    config.host = next_value(&mut args, &arg)?;
                }
                "--port" | "-p" => {
                    config.port = parse_value(&mut args, &arg)?;
                }
                "--count" | "-n" => {
                    config.iterations = parse_value(&mut args, &arg)?;
                }
                "--interval" => {
                    config.interval = Duration::from_millis(parse_value(&mut args, &arg)?);
                }
                "--message" | "-m" => {
                    config.message = Message::framed(next_value(&mut args, &arg)?)?;
                }
                "--no-reply" => {
                    config.expect_reply = false;
                }
                "--timeout" => {
                    let timeout = optional_millis(parse_value(&mut args, &arg)?);
                    config.connection.read_timeout = timeout;
                    config.connection.write_timeout = timeout;
                }
                "--max-line" => {
                    config.connection.max_line_length = parse_value(&mut args, &arg)?;
                }
                "--help" | "-h" => return Ok(CliCommand::Help),
                "--version" | "-v" => return Ok(CliCommand::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliCommand::Run(config))
    }

    /// Returns the peer address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn next_value<I>(args: &mut I, flag: &str) -> Result<String, ConfigError>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse_value<I, T>(args: &mut I, flag: &str) -> Result<T, ConfigError>
where
    I: Iterator<Item = String>,
    T: std::str::FromStr,
{
    let value = next_value(args, flag)?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}

/// `0` means no limit.
fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
