//! Connection builder and runtime loop.
//!
//! A [`Connection`] owns one socket. The [`ConnectionBuilder`] configures it
//! and starts two tasks:
//! 1. The writer task (see [`crate::writer`]), fed by [`Connection::write`]
//! 2. The read task: socket bytes → [`ClientMessageReader`] → (fragments
//!    through [`FragmentedMessageHandler`]) → dispatch channel
//!
//! ```text
//!                ┌───────────── Connection ─────────────┐
//! write() ──────►│ WriterHandle ─► writer task ─────────┼──► socket
//!                │                                      │
//! dispatch ◄─────│ read task ◄─ reassembler ◄─ reader ◄─┼─── socket
//!                └──────────────────────────────────────┘
//! ```
//!
//! A connection is either alive or closed, and closing is one-way. The
//! owner learns about a close through the optional close channel.
//!
//! # Example
//!
//! ```no_run
//! use gridwire_client::ConnectionBuilder;
//! use gridwire_client::protocol::{ClientMessage, Frame};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (connection, mut inbound) = ConnectionBuilder::new()
//!         .pipelining_threshold(16 * 1024)
//!         .connect("127.0.0.1:5701")
//!         .await?;
//!
//!     let mut request = ClientMessage::for_encode();
//!     request.add_frame(Frame::initial(16));
//!     connection.write(request).await?;
//!
//!     if let Some(response) = inbound.recv().await {
//!         println!("correlation id {}", response.correlation_id()?);
//!     }
//!
//!     connection.close(Some("Done"), None);
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{GridwireError, Result};
use crate::protocol::{ClientMessage, ClientMessageReader, FragmentedMessageHandler, Frame};
use crate::writer::{now_millis, spawn_writer_task, WriteCompletion, WriterHandle};

/// Reason used when the peer closes the socket.
pub const REMOTE_CLOSE_REASON: &str = "Connection closed by the remote end";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Sent to the owner once, when a connection closes.
#[derive(Debug, Clone)]
pub struct CloseEvent {
    pub connection_id: u64,
    pub reason: Option<String>,
    pub cause: Option<Arc<GridwireError>>,
}

/// Builder for configuring and starting a connection.
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    connection_id: Option<u64>,
    close_tx: Option<mpsc::UnboundedSender<CloseEvent>>,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            connection_id: None,
            close_tx: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable write coalescing.
    ///
    /// Default: enabled
    pub fn pipelining_enabled(mut self, enabled: bool) -> Self {
        self.config.pipelining_enabled = enabled;
        self
    }

    /// Set the byte budget of one coalesced write.
    ///
    /// Default: 8192
    pub fn pipelining_threshold(mut self, threshold: usize) -> Self {
        self.config.pipelining_threshold = threshold;
        self
    }

    /// Set `TCP_NODELAY` when connecting.
    ///
    /// Default: true
    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.config.no_delay = no_delay;
        self
    }

    /// Set the largest accepted inbound frame.
    pub fn max_frame_length(mut self, max: u32) -> Self {
        self.config.max_frame_length = max;
        self
    }

    /// Cap inbound messages partially reassembled from fragments.
    ///
    /// Default: 1024
    pub fn max_fragmented_messages(mut self, max: usize) -> Self {
        self.config.max_fragmented_messages = max;
        self
    }

    /// Set the socket read buffer size.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Use a fixed connection id instead of the next process-wide one.
    pub fn connection_id(mut self, id: u64) -> Self {
        self.connection_id = Some(id);
        self
    }

    /// Report the close of this connection on `tx`.
    pub fn on_close(mut self, tx: mpsc::UnboundedSender<CloseEvent>) -> Self {
        self.close_tx = Some(tx);
        self
    }

    /// Open a TCP connection and start it.
    pub async fn connect<A: ToSocketAddrs>(
        self,
        addr: A,
    ) -> Result<(Connection, mpsc::UnboundedReceiver<ClientMessage>)> {
        self.config.validate()?;

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(self.config.no_delay)?;
        let remote = stream.peer_addr().ok();
        let local = stream.local_addr().ok();

        let (read_half, write_half) = stream.into_split();
        self.start_halves(read_half, write_half, remote, local)
    }

    /// Start a connection over an already open byte stream.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<S>(self, stream: S) -> Result<(Connection, mpsc::UnboundedReceiver<ClientMessage>)>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.config.validate()?;

        let (read_half, write_half) = tokio::io::split(stream);
        self.start_halves(read_half, write_half, None, None)
    }

    fn start_halves<R, W>(
        self,
        reader: R,
        writer: W,
        remote_address: Option<SocketAddr>,
        local_address: Option<SocketAddr>,
    ) -> Result<(Connection, mpsc::UnboundedReceiver<ClientMessage>)>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, writer_task) = spawn_writer_task(writer, self.config.writer_config());
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            id: self
                .connection_id
                .unwrap_or_else(|| NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            remote_address,
            local_address,
            writer,
            reads: Arc::new(ReadStats::default()),
            start_time_millis: now_millis(),
            closed: Mutex::new(None),
            read_task: Mutex::new(None),
            close_tx: self.close_tx,
        });

        let read_task = tokio::spawn(run_reader(
            reader,
            writer_task,
            Arc::downgrade(&inner),
            Arc::clone(&inner.reads),
            dispatch_tx,
            self.config,
        ));
        *inner.read_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(read_task);

        let connection = Connection { inner };
        debug!(connection = %connection, "Connection started");
        Ok((connection, dispatch_rx))
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct ReadStats {
    bytes_read: AtomicU64,
    last_read_millis: AtomicU64,
}

#[derive(Debug)]
struct ClosedState {
    time_millis: u64,
    reason: Option<String>,
    cause: Option<Arc<GridwireError>>,
}

struct Inner {
    id: u64,
    remote_address: Option<SocketAddr>,
    local_address: Option<SocketAddr>,
    writer: WriterHandle,
    reads: Arc<ReadStats>,
    start_time_millis: u64,
    closed: Mutex<Option<ClosedState>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    close_tx: Option<mpsc::UnboundedSender<CloseEvent>>,
}

impl Inner {
    fn is_alive(&self) -> bool {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn close(&self, reason: Option<&str>, cause: Option<GridwireError>) {
        let cause = cause.map(Arc::new);
        {
            let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
            if closed.is_some() {
                return;
            }
            *closed = Some(ClosedState {
                time_millis: now_millis(),
                reason: reason.map(str::to_string),
                cause: cause.clone(),
            });
        }

        self.log_close(reason, cause.as_deref());

        let writer_reason = match (&cause, reason) {
            (Some(cause), _) => cause.to_string(),
            (None, Some(reason)) => reason.to_string(),
            (None, None) => "Connection closed".to_string(),
        };
        self.writer.close(writer_reason);

        if let Some(task) = self
            .read_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }

        if let Some(tx) = &self.close_tx {
            let _ = tx.send(CloseEvent {
                connection_id: self.id,
                reason: reason.map(str::to_string),
                cause,
            });
        }
    }

    fn log_close(&self, reason: Option<&str>, cause: Option<&GridwireError>) {
        let reason = reason.unwrap_or("Socket explicitly closed");
        match cause {
            None => info!("{} closed. Reason: {}", ConnectionDisplay(self), reason),
            Some(cause) => warn!(
                "{} closed. Reason: {} - {}",
                ConnectionDisplay(self),
                reason,
                cause
            ),
        }
    }
}

struct ConnectionDisplay<'a>(&'a Inner);

impl fmt::Display for ConnectionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0;
        write!(f, "Connection{{alive={}, connection_id={}, remote_address=", inner.is_alive(), inner.id)?;
        match inner.remote_address {
            Some(addr) => write!(f, "{addr}}}"),
            None => write!(f, "unknown}}"),
        }
    }
}

/// A live (or closed) connection to one server.
///
/// Cheap to clone; all clones refer to the same socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.inner.remote_address
    }

    #[inline]
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.inner.local_address
    }

    /// Queue a message for sending.
    ///
    /// The completion resolves once the message is flushed to the socket, or
    /// fails if the connection closes or the socket errors first.
    pub fn write(&self, message: ClientMessage) -> WriteCompletion {
        self.inner.writer.write(message)
    }

    /// Close the connection. Only the first call has any effect.
    ///
    /// Logs at info level without a cause and at warn level with one, stops
    /// the writer (rejecting queued writes), stops reading and notifies the
    /// owner.
    pub fn close(&self, reason: Option<&str>, cause: Option<GridwireError>) {
        self.inner.close(reason, cause);
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    fn with_closed<T>(&self, f: impl FnOnce(&ClosedState) -> T) -> Option<T> {
        self.inner
            .closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }

    pub fn closed_reason(&self) -> Option<String> {
        self.with_closed(|state| state.reason.clone()).flatten()
    }

    pub fn close_cause(&self) -> Option<Arc<GridwireError>> {
        self.with_closed(|state| state.cause.clone()).flatten()
    }

    /// Close time in epoch milliseconds, 0 while alive.
    pub fn closed_time_millis(&self) -> u64 {
        self.with_closed(|state| state.time_millis).unwrap_or(0)
    }

    #[inline]
    pub fn start_time_millis(&self) -> u64 {
        self.inner.start_time_millis
    }

    /// Epoch milliseconds of the last socket read, 0 before the first.
    pub fn last_read_millis(&self) -> u64 {
        self.inner.reads.last_read_millis.load(Ordering::Relaxed)
    }

    /// Epoch milliseconds of the last socket write, 0 before the first.
    pub fn last_write_millis(&self) -> u64 {
        self.inner.writer.last_write_millis()
    }

    pub fn bytes_read(&self) -> u64 {
        self.inner.reads.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.writer.bytes_written()
    }

    /// Writes accepted but not yet flushed or rejected.
    pub fn pending_writes(&self) -> usize {
        self.inner.writer.pending_count()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Connection {}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&ConnectionDisplay(&self.inner), f)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&ConnectionDisplay(&self.inner), f)
    }
}

/// Read task body: read until EOF or error, then close the connection.
///
/// Also watches the writer task so a failed write closes the connection.
async fn run_reader<R>(
    reader: R,
    writer_task: JoinHandle<Result<()>>,
    connection: Weak<Inner>,
    stats: Arc<ReadStats>,
    dispatch: mpsc::UnboundedSender<ClientMessage>,
    config: ConnectionConfig,
) where
    R: AsyncRead + Unpin,
{
    let (reason, cause) = tokio::select! {
        result = read_loop(reader, &stats, &dispatch, &config) => match result {
            Ok(()) => (
                REMOTE_CLOSE_REASON,
                GridwireError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, REMOTE_CLOSE_REASON)),
            ),
            Err(e) => {
                error!("Read loop error: {}", e);
                let reason = match e {
                    GridwireError::Protocol(_) => "Malformed message stream",
                    _ => "Socket read failed",
                };
                (reason, e)
            }
        },
        finished = writer_task => match finished {
            // Closed through the connection, nothing left to do
            Ok(Ok(())) => return,
            Ok(Err(e)) => ("Socket write failed", e),
            Err(join_error) => (
                "Writer task stopped",
                GridwireError::ConnectionClosed(join_error.to_string()),
            ),
        },
    };

    if let Some(connection) = connection.upgrade() {
        connection.close(Some(reason), Some(cause));
    }
}

/// Main read loop - turns socket bytes into dispatched messages.
///
/// Returns `Ok(())` on EOF.
async fn read_loop<R>(
    mut reader: R,
    stats: &ReadStats,
    dispatch: &mpsc::UnboundedSender<ClientMessage>,
    config: &ConnectionConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut messages = ClientMessageReader::with_capacity_and_max_frame_length(
        config.read_buffer_size,
        config.max_frame_length,
    );
    let mut fragments =
        FragmentedMessageHandler::with_max_in_flight(config.max_fragmented_messages);

    loop {
        let buffer = messages.buffer_mut();
        buffer.reserve(config.read_buffer_size);
        let n = reader.read_buf(buffer).await?;
        if n == 0 {
            return Ok(());
        }
        stats.last_read_millis.store(now_millis(), Ordering::Relaxed);
        stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);

        while let Some(message) = messages.read()? {
            let unfragmented = message
                .start_frame()
                .is_some_and(Frame::has_unfragmented_message_flag);
            let complete = if unfragmented {
                Some(message)
            } else {
                fragments.handle(message)
            };

            if let Some(message) = complete {
                if dispatch.send(message).is_err() {
                    debug!("Dispatch receiver dropped, discarding inbound message");
                }
            }
        }
    }
}
