//! Line Connection
//!
//! Owns one byte stream and speaks the newline protocol over it.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Connection::connect (TCP handshake, optional timeout)
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  write_message / read_line   │
//!    │  (any order, any number)     │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. Connection::close (flush + shutdown of the write half)
//!        │
//!        ▼
//! 4. Socket released when the Connection is dropped
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes are appended to a `BytesMut`. TCP is a stream protocol, so a
//! read may deliver half a line or several lines at once. `read_line` hands
//! the buffer to the framer, and only goes back to the socket when no complete
//! line is buffered. Leftover bytes after a delimiter are kept for the next
//! call.

use crate::protocol::{LineFramer, Message, ParseError, DEFAULT_MAX_LINE_LENGTH};
use bytes::BytesMut;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Per-connection tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Limit on establishing the TCP connection (None waits forever)
    pub connect_timeout: Option<Duration>,

    /// Limit on receiving one complete line (None waits forever)
    pub read_timeout: Option<Duration>,

    /// Limit on writing and flushing one message (None waits forever)
    pub write_timeout: Option<Duration>,

    /// Longest accepted incoming line, delimiter excluded
    pub max_line_length: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            read_timeout: Some(Duration::from_secs(10)),
            write_timeout: Some(Duration::from_secs(10)),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Traffic counters for one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Complete lines handed to the caller
    pub lines_read: u64,
    /// Messages written in full
    pub messages_written: u64,
    /// Total bytes read from the transport
    pub bytes_read: u64,
    /// Total bytes written to the transport
    pub bytes_written: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn line_read(&mut self) {
        self.lines_read += 1;
    }

    fn message_written(&mut self, bytes: usize) {
        self.messages_written += 1;
        self.bytes_written += bytes as u64;
    }

    fn bytes_read(&mut self, count: usize) {
        self.bytes_read += count as u64;
    }
}

/// Which direction an operation was moving data in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Write => write!(f, "write"),
        }
    }
}

/// A connection speaking the newline protocol.
///
/// Generic over the stream so any `AsyncRead + AsyncWrite` transport works;
/// production code uses [`TcpStream`] through [`Connection::connect`].
pub struct Connection<S = TcpStream> {
    /// The underlying stream
    stream: BufWriter<S>,

    /// Peer description (for logging)
    peer: String,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Delimiter scanner
    framer: LineFramer,

    config: ConnectionConfig,

    stats: ConnectionStats,

    /// Set once a write failed or timed out part way through. The stream may
    /// hold half a message at that point, so nothing more is sent on it.
    broken: bool,
}

impl Connection<TcpStream> {
    /// Opens a TCP connection to `host:port`.
    ///
    /// Fails with [`ConnectionError::ConnectFailure`] if the address cannot be
    /// resolved, the peer refuses, or the connect timeout expires.
    pub async fn connect(host: &str, port: u16, config: ConnectionConfig) -> ConnectionResult<Self> {
        let addr = format!("{}:{}", host, port);
        debug!(peer = %addr, "Connecting");

        let attempt = TcpStream::connect(addr.as_str());
        let connected = match config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", limit),
                )),
            },
            None => attempt.await,
        };

        let stream = match connected {
            Ok(stream) => stream,
            Err(source) => {
                warn!(peer = %addr, error = %source, "Connect failed");
                return Err(ConnectionError::ConnectFailure { addr, source });
            }
        };

        // Request/reply traffic: don't hold small messages back.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %addr, error = %e, "Could not set TCP_NODELAY");
        }

        info!(peer = %addr, "Connected");
        Ok(Self::new(stream, addr, config))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already established stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - The connected stream, exclusively owned from now on
    /// * `peer` - Description of the remote end, used in log lines
    /// * `config` - Timeouts and line limit
    pub fn new(stream: S, peer: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            stream: BufWriter::new(stream),
            peer: peer.into(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            framer: LineFramer::with_max_line_length(config.max_line_length),
            config,
            stats: ConnectionStats::new(),
            broken: false,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Longest incoming line this connection accepts.
    pub fn max_line_length(&self) -> usize {
        self.framer.max_line_length()
    }

    /// True after a failed write; every later read or write is refused.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Bytes received but not yet returned as a line.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reads the next line, delimiter excluded.
    ///
    /// Returns lines already sitting in the buffer without touching the
    /// socket. Fails with [`ConnectionError::EndOfStream`] if the peer closes
    /// before a delimiter arrives, never looping on a closed stream.
    pub async fn read_line(&mut self) -> ConnectionResult<Message> {
        if self.broken {
            return Err(broken_stream());
        }
        let limit = self.config.read_timeout;
        with_timeout(limit, Operation::Read, self.next_line()).await
    }

    /// Writes `text` as UTF-8.
    ///
    /// No delimiter is appended; include it in `text` when the peer needs to
    /// see the end of the message.
    pub async fn write_message(&mut self, text: &str) -> ConnectionResult<()> {
        self.write_bytes(text.as_bytes()).await
    }

    /// Writes `data` in full and flushes it.
    ///
    /// Short writes are retried until every byte is accepted; anything else
    /// surfaces as [`ConnectionError::WriteFailure`]. A write that does not
    /// finish within the write timeout also fails with `WriteFailure`, with
    /// an [`std::io::ErrorKind::TimedOut`] source.
    ///
    /// After any failed write part of the message may already be on the
    /// wire. The connection is then marked broken and refuses further reads
    /// and writes.
    pub async fn write_bytes(&mut self, data: &[u8]) -> ConnectionResult<()> {
        if self.broken {
            return Err(broken_stream());
        }

        let limit = self.config.write_timeout;
        let sent = match with_timeout(limit, Operation::Write, self.send(data)).await {
            Err(ConnectionError::Timeout { operation, after }) => {
                Err(ConnectionError::WriteFailure(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{} timed out after {:?}", operation, after),
                )))
            }
            other => other,
        };

        if let Err(e) = sent {
            self.broken = true;
            warn!(peer = %self.peer, error = %e, "Write failed, connection unusable");
            return Err(e);
        }

        self.stats.message_written(data.len());
        trace!(peer = %self.peer, bytes = data.len(), "Sent message");
        Ok(())
    }

    /// Flushes pending output and shuts down the write half.
    ///
    /// Consumes the connection; the socket is released on return. Returns
    /// the final traffic counters.
    pub async fn close(mut self) -> ConnectionResult<ConnectionStats> {
        if !self.buffer.is_empty() {
            debug!(
                peer = %self.peer,
                buffered = self.buffer.len(),
                "Discarding unread data on close"
            );
        }

        if self.broken {
            // Skip the flush: the buffer holds the rest of a failed message.
            self.stream
                .get_mut()
                .shutdown()
                .await
                .map_err(ConnectionError::WriteFailure)?;
        } else {
            self.stream
                .shutdown()
                .await
                .map_err(ConnectionError::WriteFailure)?;
        }

        info!(
            peer = %self.peer,
            lines_read = self.stats.lines_read,
            messages_written = self.stats.messages_written,
            "Connection closed"
        );
        Ok(self.stats)
    }

    /// The read-until-delimiter loop.
    async fn next_line(&mut self) -> ConnectionResult<Message> {
        loop {
            if let Some(line) = self.framer.decode(&mut self.buffer)? {
                self.stats.line_read();
                trace!(
                    peer = %self.peer,
                    len = line.len(),
                    remaining = self.buffer.len(),
                    "Parsed line"
                );
                return Ok(line);
            }

            self.read_more_data().await?;
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> ConnectionResult<()> {
        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self
            .stream
            .get_mut()
            .read_buf(&mut self.buffer)
            .await
            .map_err(ConnectionError::ReadFailure)?;

        if n == 0 {
            debug!(
                peer = %self.peer,
                buffered = self.buffer.len(),
                "Peer closed the stream mid-line"
            );
            return Err(ConnectionError::EndOfStream {
                buffered: self.buffer.len(),
            });
        }

        self.stats.bytes_read(n);
        trace!(peer = %self.peer, bytes = n, "Read data");
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> ConnectionResult<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(ConnectionError::WriteFailure)?;
        self.stream
            .flush()
            .await
            .map_err(ConnectionError::WriteFailure)
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("buffered", &self.buffer.len())
            .field("stats", &self.stats)
            .field("broken", &self.broken)
            .finish()
    }
}

fn broken_stream() -> ConnectionError {
    ConnectionError::WriteFailure(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "connection unusable after a failed write",
    ))
}

async fn with_timeout<T, F>(limit: Option<Duration>, operation: Operation, fut: F) -> ConnectionResult<T>
where
    F: Future<Output = ConnectionResult<T>>,
{
    match limit {
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout { operation, after }),
        },
        None => fut.await,
    }
}

/// Errors that can occur on a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The stream could not be established
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport error while reading
    #[error("read failed: {0}")]
    ReadFailure(#[source] std::io::Error),

    /// Peer closed the stream before a delimiter arrived
    #[error("peer closed the stream before a delimiter ({buffered} bytes buffered)")]
    EndOfStream { buffered: usize },

    /// Transport error while writing, or a write that could not complete
    #[error("write failed: {0}")]
    WriteFailure(#[source] std::io::Error),

    /// A read did not finish in time
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    /// Framing or decoding error
    #[error("framing error: {0}")]
    Parse(#[from] ParseError),
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn no_timeouts() -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    #[tokio::test]
    async fn test_read_single_line() {
        let mock = Builder::new().read(b"test\n").build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        let line = conn.read_line().await.unwrap();
        assert_eq!(line.as_bytes(), b"test");
        assert_eq!(conn.stats().lines_read, 1);
        assert_eq!(conn.stats().bytes_read, 5);
    }

    #[tokio::test]
    async fn test_read_line_split_across_segments() {
        let mock = Builder::new().read(b"te").read(b"s").read(b"t\n").build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        assert_eq!(conn.read_line().await.unwrap().as_bytes(), b"test");
    }

    #[tokio::test]
    async fn test_two_lines_in_one_segment() {
        let mock = Builder::new().read(b"hello\nworld\n").build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        assert_eq!(conn.read_line().await.unwrap().as_bytes(), b"hello");
        assert_eq!(conn.buffered(), 6);
        assert_eq!(conn.read_line().await.unwrap().as_bytes(), b"world");
        assert_eq!(conn.buffered(), 0);
    }

    #[tokio::test]
    async fn test_end_of_stream_before_delimiter() {
        let mock = Builder::new().read(b"partial").build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        let err = conn.read_line().await.unwrap_err();
        assert!(matches!(err, ConnectionError::EndOfStream { buffered: 7 }));
    }

    #[tokio::test]
    async fn test_end_of_stream_on_empty_stream() {
        let mock = Builder::new().build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        let err = conn.read_line().await.unwrap_err();
        assert!(matches!(err, ConnectionError::EndOfStream { buffered: 0 }));
    }

    #[tokio::test]
    async fn test_read_failure() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        let err = conn.read_line().await.unwrap_err();
        match err {
            ConnectionError::ReadFailure(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let mut config = no_timeouts();
        config.max_line_length = 8;
        let mock = Builder::new().read(b"0123456789").build();
        let mut conn = Connection::new(mock, "mock", config);
        assert_eq!(conn.max_line_length(), 8);

        let err = conn.read_line().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Parse(ParseError::LineTooLong { size: 10, max: 8 })
        ));
    }

    #[tokio::test]
    async fn test_write_message_is_not_framed() {
        let mock = Builder::new().write(b"test\n").write(b"raw").build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        conn.write_message("test\n").await.unwrap();
        conn.write_message("raw").await.unwrap();
        assert_eq!(conn.stats().messages_written, 2);
        assert_eq!(conn.stats().bytes_written, 8);
    }

    #[tokio::test]
    async fn test_write_accepted_in_pieces() {
        // The wait splits the expected bytes, so the first write comes up short.
        let mock = Builder::new()
            .write(b"he")
            .wait(Duration::from_millis(5))
            .write(b"llo\n")
            .build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        conn.write_bytes(b"hello\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_write_failure() {
        let mock = Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "gone",
            ))
            .build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        let err = conn.write_message("test\n").await.unwrap_err();
        assert!(matches!(err, ConnectionError::WriteFailure(_)));
        assert_eq!(conn.stats().messages_written, 0);
        assert!(conn.is_broken());

        // Refused without touching the stream
        let err = conn.write_message("again\n").await.unwrap_err();
        assert!(matches!(err, ConnectionError::WriteFailure(_)));
    }

    #[tokio::test]
    async fn test_write_timeout_marks_connection_broken() {
        // Two bytes go out, then the stream stalls far longer than the limit.
        let mock = Builder::new()
            .write(b"AA")
            .wait(Duration::from_secs(5))
            .build();
        let mut config = no_timeouts();
        config.write_timeout = Some(Duration::from_millis(50));
        let mut conn = Connection::new(mock, "mock", config);

        let started = std::time::Instant::now();
        let err = conn.write_bytes(b"AAA\n").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        match err {
            ConnectionError::WriteFailure(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::TimedOut)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(conn.is_broken());
        assert_eq!(conn.stats().messages_written, 0);

        // Nothing more may follow the half-sent message.
        assert!(matches!(
            conn.write_message("B\n").await,
            Err(ConnectionError::WriteFailure(_))
        ));
        assert!(matches!(
            conn.read_line().await,
            Err(ConnectionError::WriteFailure(_))
        ));

        // Close must not flush the leftover "A\n" either.
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_timeout_does_not_merge_messages_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();

        // Don't read until the client is done, so its large write stalls.
        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = go_rx.await;
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut config = no_timeouts();
        config.write_timeout = Some(Duration::from_millis(100));
        let mut conn = Connection::connect("127.0.0.1", addr.port(), config)
            .await
            .unwrap();

        let size = 64 * 1024 * 1024;
        let mut payload = vec![b'x'; size];
        payload.push(b'\n');
        assert!(matches!(
            conn.write_bytes(&payload).await,
            Err(ConnectionError::WriteFailure(_))
        ));
        assert!(conn.write_message("next\n").await.is_err());
        conn.close().await.unwrap();
        go_tx.send(()).unwrap();

        let received = peer.await.unwrap();
        assert!(received.len() < size);
        assert!(received.iter().all(|&b| b == b'x'));
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // Non-routable address: the handshake never completes.
        let mut config = no_timeouts();
        config.connect_timeout = Some(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let err = Connection::connect("10.255.255.1", 81, config)
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, ConnectionError::ConnectFailure { .. }));
    }

    #[tokio::test]
    async fn test_request_reply_then_close() {
        let mock = Builder::new().write(b"test\n").read(b"ok\n").build();
        let mut conn = Connection::new(mock, "mock", no_timeouts());

        conn.write_message("test\n").await.unwrap();
        assert_eq!(conn.read_line().await.unwrap().as_bytes(), b"ok");

        let stats = conn.close().await.unwrap();
        assert_eq!(stats.messages_written, 1);
        assert_eq!(stats.lines_read, 1);
    }

    #[tokio::test]
    async fn test_read_timeout_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept and hold the socket open without ever writing.
        let holder = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let mut config = no_timeouts();
        config.read_timeout = Some(Duration::from_millis(100));
        let mut conn = Connection::connect("127.0.0.1", addr.port(), config)
            .await
            .unwrap();

        let err = conn.read_line().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Timeout {
                operation: Operation::Read,
                ..
            }
        ));
        holder.abort();
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Grab a free port, then release it so nothing is listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Connection::connect("127.0.0.1", port, ConnectionConfig::default())
            .await
            .unwrap_err();
        match err {
            ConnectionError::ConnectFailure { addr, .. } => {
                assert_eq!(addr, format!("127.0.0.1:{}", port))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_large_payload_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let size = 1024 * 1024;

        let peer = tokio::spawn(async move {
            let (stream, client) = listener.accept().await.unwrap();
            let mut config = no_timeouts();
            config.max_line_length = 2 * size;
            let mut conn = Connection::new(stream, client.to_string(), config);

            let line = conn.read_line().await.unwrap();
            assert!(line.as_bytes().iter().all(|&b| b == b'a'));
            conn.write_message(&format!("{}\n", line.len())).await.unwrap();
            conn.close().await.unwrap();
        });

        let mut conn = Connection::connect("127.0.0.1", addr.port(), no_timeouts())
            .await
            .unwrap();
        let mut payload = vec![b'a'; size];
        payload.push(b'\n');
        conn.write_bytes(&payload).await.unwrap();

        let reply = conn.read_line().await.unwrap();
        assert_eq!(reply.to_text().unwrap(), size.to_string());
        peer.await.unwrap();
    }
}
