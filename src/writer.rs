//! Dedicated writer task for outbound messages.
//!
//! Callers never touch the socket. They hand messages to a [`WriterHandle`],
//! which queues them on an mpsc channel for a single writer task and returns
//! a [`WriteCompletion`] that resolves once the bytes are flushed.
//!
//! # Architecture
//!
//! ```text
//! Invocation 1 ─┐
//! Invocation 2 ─┼─► mpsc::UnboundedSender<PendingWrite> ─► Writer Task ─► Socket
//! Invocation N ─┘                                             │
//!                                                 completions resolved in order
//! ```
//!
//! # Strategies
//!
//! - **Direct**: one serialized message per socket write.
//! - **Pipelined**: every ready message is queued, then consecutive messages
//!   are packed into one reusable coalescing buffer until the threshold is
//!   reached. A lone message bigger than the threshold is written straight
//!   from its own buffer.
//!
//! Backpressure is the socket itself: the task waits on write readiness and
//! keeps queueing while it waits.
//!
//! # Failure
//!
//! The first write error is terminal. Every message in flight or still
//! queued is rejected with [`GridwireError::WriteFailed`] carrying that same
//! cause, the socket is shut down, and later writes are rejected without
//! touching it.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{GridwireError, Result};
use crate::protocol::ClientMessage;

/// Default pipelining threshold in bytes.
pub const DEFAULT_PIPELINING_THRESHOLD: usize = 8192;

/// How the writer task turns queued messages into socket writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStrategy {
    Direct,
    Pipelined { threshold: usize },
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub strategy: WriterStrategy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            strategy: WriterStrategy::Pipelined {
                threshold: DEFAULT_PIPELINING_THRESHOLD,
            },
        }
    }
}

/// A message waiting for the writer task.
#[derive(Debug)]
struct PendingWrite {
    message: ClientMessage,
    completion: oneshot::Sender<Result<()>>,
}

impl PendingWrite {
    fn resolve(self, result: Result<()>) {
        // The caller may have dropped its completion.
        let _ = self.completion.send(result);
    }
}

/// Resolves when a message has been flushed, or fails with the reason it
/// never will be.
#[derive(Debug)]
#[must_use = "a write completion does nothing unless awaited"]
pub struct WriteCompletion {
    rx: oneshot::Receiver<Result<()>>,
}

impl WriteCompletion {
    fn rejected(err: GridwireError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl Future for WriteCompletion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(GridwireError::ConnectionClosed("Writer stopped".to_string()))
            })
        })
    }
}

/// Why the writer stopped accepting messages.
#[derive(Debug, Clone)]
enum CloseCause {
    Failed(Arc<io::Error>),
    Closed(String),
}

impl CloseCause {
    fn to_error(&self) -> GridwireError {
        match self {
            CloseCause::Failed(e) => GridwireError::WriteFailed(Arc::clone(e)),
            CloseCause::Closed(reason) => GridwireError::ConnectionClosed(reason.clone()),
        }
    }
}

/// State shared between the handles and the writer task.
#[derive(Debug, Default)]
struct Shared {
    close_cause: Mutex<Option<CloseCause>>,
    shutdown: Notify,
    pending: AtomicUsize,
    bytes_written: AtomicU64,
    last_write_millis: AtomicU64,
}

impl Shared {
    fn close_cause(&self) -> Option<CloseCause> {
        self.close_cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record the cause unless one is already set. Returns the cause in force.
    fn set_close_cause(&self, cause: CloseCause) -> CloseCause {
        let mut guard = self.close_cause.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get_or_insert(cause).clone()
    }

    fn record_write(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_write_millis.store(now_millis(), Ordering::Relaxed);
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Handle for sending messages to the writer task.
///
/// This is cheaply cloneable and can be shared across invocations.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<PendingWrite>,
    shared: Arc<Shared>,
}

impl WriterHandle {
    /// Queue a message. Never blocks and never fails synchronously.
    ///
    /// If the writer is already closed the returned completion is rejected
    /// immediately and the socket is not touched.
    pub fn write(&self, message: ClientMessage) -> WriteCompletion {
        if let Some(cause) = self.shared.close_cause() {
            return WriteCompletion::rejected(cause.to_error());
        }

        let (tx, rx) = oneshot::channel();
        self.shared.pending.fetch_add(1, Ordering::AcqRel);

        if let Err(mpsc::error::SendError(write)) = self.tx.send(PendingWrite {
            message,
            completion: tx,
        }) {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            let err = self
                .shared
                .close_cause()
                .map(|cause| cause.to_error())
                .unwrap_or_else(|| GridwireError::ConnectionClosed("Writer stopped".to_string()));
            write.resolve(Err(err));
        }

        WriteCompletion { rx }
    }

    /// Stop the writer. Queued and in-flight writes are rejected with
    /// [`GridwireError::ConnectionClosed`]. Idempotent; the first cause wins.
    pub fn close(&self, reason: impl Into<String>) {
        self.shared.set_close_cause(CloseCause::Closed(reason.into()));
        self.shared.shutdown.notify_one();
    }

    /// Check if the writer has stopped accepting messages.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.close_cause().is_some()
    }

    /// Messages accepted but not yet flushed or rejected.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Total bytes handed to the socket.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.shared.bytes_written.load(Ordering::Relaxed)
    }

    /// Wall-clock time of the last successful write in epoch milliseconds,
    /// or 0 if nothing has been written.
    #[inline]
    pub fn last_write_millis(&self) -> u64 {
        self.shared.last_write_millis.load(Ordering::Relaxed)
    }
}

/// Spawn the writer task and return a handle for sending messages.
///
/// The task ends with `Ok(())` after [`WriterHandle::close`] or once every
/// handle is dropped, and with `Err(WriteFailed)` after a socket error.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());

    let handle = WriterHandle {
        tx,
        shared: Arc::clone(&shared),
    };
    let task = tokio::spawn(writer_loop(rx, writer, shared, config.strategy));

    (handle, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop - queues messages, writes batches, resolves completions.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<PendingWrite>,
    mut writer: W,
    shared: Arc<Shared>,
    strategy: WriterStrategy,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut queue: VecDeque<PendingWrite> = VecDeque::new();
    let mut coalescing = match strategy {
        WriterStrategy::Pipelined { threshold } => BytesMut::with_capacity(threshold),
        WriterStrategy::Direct => BytesMut::new(),
    };

    loop {
        if queue.is_empty() {
            tokio::select! {
                biased;
                _ = shared.shutdown.notified() => break,
                next = rx.recv() => match next {
                    Some(write) => queue.push_back(write),
                    // Every handle dropped
                    None => break,
                },
            }
        }

        // Everything ready by now joins this tick
        while let Ok(write) = rx.try_recv() {
            queue.push_back(write);
        }

        let batch = take_batch(&mut queue, strategy);
        let own_buffer = single_message_buffer(&batch, strategy);
        if own_buffer.is_none() {
            for write in &batch {
                write.message.write_to(&mut coalescing);
            }
        }

        let outcome = {
            let data: &[u8] = own_buffer.as_deref().unwrap_or(&coalescing);
            tokio::select! {
                biased;
                _ = shared.shutdown.notified() => None,
                result = write_and_flush(&mut writer, data) => Some(result.map(|()| data.len())),
            }
        };
        coalescing.clear();

        match outcome {
            Some(Ok(len)) => {
                shared.record_write(len);
                shared.pending.fetch_sub(batch.len(), Ordering::AcqRel);
                for write in batch {
                    write.resolve(Ok(()));
                }
            }
            Some(Err(e)) => {
                let cause = shared.set_close_cause(CloseCause::Failed(Arc::new(e)));
                debug!(error = %cause.to_error(), "Socket write failed, rejecting queued writes");
                reject_all(batch, queue, &mut rx, &shared, &cause).await;
                let _ = writer.shutdown().await;
                return Err(cause.to_error());
            }
            None => {
                // Closed mid-write: the batch is rejected ahead of the queue
                for write in batch.into_iter().rev() {
                    queue.push_front(write);
                }
                break;
            }
        }
    }

    let cause = shared.set_close_cause(CloseCause::Closed("Writer closed".to_string()));
    reject_all(Vec::new(), queue, &mut rx, &shared, &cause).await;
    let _ = writer.shutdown().await;
    Ok(())
}

/// Pick the messages for the next socket write. Messages only leave the
/// front of the queue.
fn take_batch(queue: &mut VecDeque<PendingWrite>, strategy: WriterStrategy) -> Vec<PendingWrite> {
    let count = match strategy {
        WriterStrategy::Direct => 1,
        WriterStrategy::Pipelined { threshold } => {
            let mut total = 0usize;
            let mut count = 0usize;
            for write in queue.iter() {
                if total >= threshold {
                    break;
                }
                let len = write.message.total_length();
                if count > 0 && total + len > threshold {
                    break;
                }
                total += len;
                count += 1;
            }
            count.max(1)
        }
    };
    let count = count.min(queue.len());
    queue.drain(..count).collect()
}

/// A batch that is a single message gets its own buffer instead of the
/// coalescing one: always for the direct strategy, and for the pipelined
/// strategy when the message alone exceeds the threshold.
fn single_message_buffer(batch: &[PendingWrite], strategy: WriterStrategy) -> Option<Bytes> {
    match (strategy, batch) {
        (WriterStrategy::Direct, [single]) => Some(single.message.to_bytes()),
        (WriterStrategy::Pipelined { threshold }, [single])
            if single.message.total_length() > threshold =>
        {
            Some(single.message.to_bytes())
        }
        _ => None,
    }
}

async fn write_and_flush<W>(writer: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await
}

/// Reject the current batch, the queue and everything still in the channel,
/// in that order.
async fn reject_all(
    batch: Vec<PendingWrite>,
    queue: VecDeque<PendingWrite>,
    rx: &mut mpsc::UnboundedReceiver<PendingWrite>,
    shared: &Shared,
    cause: &CloseCause,
) {
    rx.close();

    let mut rejected = 0usize;
    for write in batch.into_iter().chain(queue) {
        write.resolve(Err(cause.to_error()));
        rejected += 1;
    }
    while let Some(write) = rx.recv().await {
        write.resolve(Err(cause.to_error()));
        rejected += 1;
    }

    shared.pending.fetch_sub(rejected, Ordering::AcqRel);
}
