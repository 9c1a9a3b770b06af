//! Channel-backed transport: the session actor writes frames synchronously
//! into an in-memory queue and a writer task drains it into the socket.
//!
//! The queue is bounded by a byte budget rather than by message count.
//! [`ChannelTransport::writable_capacity`] reports how much of the budget is
//! free, which gives the outbound framer the same backpressure signal a
//! virtual serial port would.  Each time the writer frees budget it signals
//! [`ChannelTransport::drained`], so the session can flush held-back bytes
//! without polling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use crate::application::outbound::{Transport, TransportError};

/// Creates a connected transport/writer pair with `budget` bytes of
/// in-flight capacity.
pub fn channel_transport(budget: usize) -> (ChannelTransport, ChannelWriter) {
    let (tx, rx) = mpsc::unbounded_channel();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let drained = Arc::new(Notify::new());
    (
        ChannelTransport {
            tx,
            in_flight: Arc::clone(&in_flight),
            drained: Arc::clone(&drained),
            budget: budget.max(1),
        },
        ChannelWriter { rx, in_flight, drained },
    )
}

/// The session-facing half.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    budget: usize,
}

impl ChannelTransport {
    /// Bytes queued but not yet written to the socket.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Signalled whenever the writer frees budget.  A signal sent while
    /// nobody waits is kept for the next waiter.
    pub fn drained(&self) -> Arc<Notify> {
        Arc::clone(&self.drained)
    }
}

impl Transport for ChannelTransport {
    fn writable_capacity(&self) -> usize {
        self.budget.saturating_sub(self.in_flight())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let n = bytes.len().min(self.writable_capacity());
        if n == 0 {
            return Ok(0);
        }
        self.in_flight.fetch_add(n, Ordering::AcqRel);
        if self.tx.send(bytes[..n].to_vec()).is_err() {
            self.in_flight.fetch_sub(n, Ordering::AcqRel);
            return Err(TransportError::Closed);
        }
        Ok(n)
    }
}

/// The socket-facing half.
pub struct ChannelWriter {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl ChannelWriter {
    /// Copies queued bytes into `sink` until the transport half is dropped.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error from `sink`.
    pub async fn run<W: AsyncWrite + Unpin>(mut self, mut sink: W) -> std::io::Result<()> {
        while let Some(bytes) = self.rx.recv().await {
            sink.write_all(&bytes).await?;
            self.in_flight.fetch_sub(bytes.len(), Ordering::AcqRel);
            self.drained.notify_one();
            trace!(n = bytes.len(), "bytes flushed to guest");
        }
        sink.flush().await?;
        debug!("transport closed; writer finished");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
