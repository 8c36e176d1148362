//! Shared handle to one accepted WebSocket connection.
//!
//! A [`Connection`] is what the [`super::RoomRegistry`] stores as a room
//! member. It never touches the socket directly: outbound frames go into a
//! bounded queue drained by the connection's writer task, and closing
//! signals a [`CancellationToken`] observed by both the writer and the
//! session's read loop.
//!
//! Equality and hashing are by handle identity. Two clones of the same
//! handle are equal; two connections are never equal, whatever their ids.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::ConnectionId;

/// A serialized frame ready to be written to a socket.
///
/// Serialized once per broadcast and shared between all recipients.
pub type OutboundFrame = Arc<str>;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient's outbound queue is full (slow or stuck peer).
    #[error("outbound queue full")]
    QueueFull,
    /// The recipient's writer has gone away.
    #[error("connection closed")]
    Closed,
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    outbound: mpsc::Sender<OutboundFrame>,
    shutdown: CancellationToken,
    closing: AtomicBool,
}

/// Cloneable handle to a connection's outbound side and close signal.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Creates a handle with an outbound queue of `buffer` frames.
    ///
    /// Returns the receiving end of the queue for the writer task.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (outbound, rx) = mpsc::channel(buffer.max(1));
        let conn = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::new(),
                outbound,
                shutdown: CancellationToken::new(),
                closing: AtomicBool::new(false),
            }),
        };
        (conn, rx)
    }

    /// Log-only identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Queues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::QueueFull`] if the writer is behind by a
    /// full buffer, or [`DeliveryError::Closed`] if the connection is
    /// closed or its writer has exited.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.inner.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Signals the writer and the read loop to shut down. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    /// Returns `true` once [`Connection::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Resolves when the connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.inner.shutdown.cancelled()
    }

    /// Claims the right to run this connection's leave/cleanup logic.
    ///
    /// Returns `true` to exactly one caller over the handle's lifetime;
    /// every later or concurrent caller gets `false`.
    #[must_use]
    pub fn try_begin_close(&self) -> bool {
        self.inner
            .closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}
