//! Request/Reply Session
//!
//! The client loop: connect, then send the configured message a fixed number
//! of times, reading one reply after each send.
//!
//! ```text
//! connect ──> ┌─────────────────────────────┐
//!             │ write message               │
//!             │ read reply (if expected)    │ x iterations
//!             │ state = update(state, reply)│
//!             │ sleep interval              │
//!             └─────────────────────────────┘ ──> close
//! ```
//!
//! The loop state is an explicit [`SessionState`] value threaded through
//! [`update`]; nothing is kept in globals.

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionResult, ConnectionStats};
use crate::protocol::Message;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Loop state carried from one exchange to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Completed exchanges
    pub exchanges: u32,

    /// Count reported by the peer
    pub count: i64,

    /// Most recent reply line, if any
    pub last_reply: Option<Message>,
}

/// Produces the state following one exchange.
///
/// The count is carried over unchanged: how a reply encodes a new count has
/// never been defined, so this does not guess at it.
pub fn update(state: SessionState, reply: Option<Message>) -> SessionState {
    SessionState {
        exchanges: state.exchanges + 1,
        count: state.count,
        last_reply: reply.or(state.last_reply),
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub stats: ConnectionStats,
    /// True when a shutdown signal ended the loop early
    pub interrupted: bool,
}

/// Connects and runs the full session.
pub async fn run_session(config: &ClientConfig) -> ConnectionResult<SessionReport> {
    run_session_until(config, std::future::pending()).await
}

/// Connects and runs the session until it completes or `shutdown` resolves.
pub async fn run_session_until<F>(config: &ClientConfig, shutdown: F) -> ConnectionResult<SessionReport>
where
    F: Future<Output = ()>,
{
    let conn = Connection::connect(&config.host, config.port, config.connection.clone()).await?;
    drive(conn, config, shutdown).await
}

/// Runs the session over an established connection.
///
/// The connection is closed before returning, whether the loop finished,
/// failed, or was interrupted.
pub async fn drive<S, F>(
    mut conn: Connection<S>,
    config: &ClientConfig,
    shutdown: F,
) -> ConnectionResult<SessionReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let mut state = SessionState::default();
    let peer = conn.peer().to_string();
    debug!(
        peer = %peer,
        rounds = config.iterations,
        max_line = conn.max_line_length(),
        "Session started"
    );

    let (result, interrupted) = tokio::select! {
        result = exchange_loop(&mut conn, config, &mut state) => (result, false),
        _ = shutdown => {
            info!(peer = %peer, "Shutdown requested, ending session early");
            (Ok(()), true)
        }
    };

    match result {
        Ok(()) => {
            let stats = conn.close().await?;
            Ok(SessionReport {
                state,
                stats,
                interrupted,
            })
        }
        Err(e) => {
            if let Err(close_err) = conn.close().await {
                debug!(error = %close_err, "Close after failed session also failed");
            }
            Err(e)
        }
    }
}

async fn exchange_loop<S>(
    conn: &mut Connection<S>,
    config: &ClientConfig,
    state: &mut SessionState,
) -> ConnectionResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for round in 1..=config.iterations {
        conn.write_bytes(&config.message).await?;

        let reply = if config.expect_reply {
            let line = conn.read_line().await?;
            info!(round, reply = %line, "Message received");
            Some(line)
        } else {
            None
        };

        *state = update(std::mem::take(state), reply);
        info!(round, count = state.count, "New count");

        if round < config.iterations {
            tokio::time::sleep(config.interval).await;
        }
    }

    Ok(())
}
