//! Outbound Framer: serialises one [`AgentMessage`] and pushes every byte of
//! it through a transport that may accept only part of it per call.
//!
//! # Backpressure (for beginners)
//!
//! The virtual channel to the guest has a small buffer.  A transport reports
//! how many bytes it can take *right now* via
//! [`Transport::writable_capacity`]; the framer writes at most that much,
//! asks again, and repeats until the transport is full or the frame is out.
//!
//! Whatever the transport cannot take yet stays in the framer's backlog, in
//! order.  The next [`OutboundFramer::send`] or [`OutboundFramer::flush`]
//! continues from the first unsent byte, so two frames never interleave and
//! no byte is dropped.  The framer itself never waits: the owner of the
//! session decides how long a non-draining transport is tolerated.

use std::io;

use thiserror::Error;
use tracing::{trace, warn};
use vdagent_core::protocol::codec::encode_agent_message;
use vdagent_core::protocol::messages::AgentMessage;

/// Default limit on bytes held back while the transport is full.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 256 * 1024;

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer side of the channel has gone away.
    #[error("transport closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Port to the byte channel towards the guest.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Bytes the transport accepts without blocking.
    fn writable_capacity(&self) -> usize;

    /// Writes up to `bytes.len()` bytes and returns how many were taken.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the channel is closed or broken.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;
}

/// Errors returned by [`OutboundFramer::send`] and [`OutboundFramer::flush`].
#[derive(Debug, Error)]
pub enum FramerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The transport is not draining and the backlog would exceed its limit.
    #[error("outbound backlog of {pending} bytes cannot take a {frame}-byte frame (limit {limit})")]
    Backlogged { pending: usize, frame: usize, limit: usize },
}

/// Writes whole frames through a [`Transport`], in order.
#[derive(Debug)]
pub struct OutboundFramer {
    backlog: Vec<u8>,
    max_pending: usize,
}

impl Default for OutboundFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_BYTES)
    }
}

impl OutboundFramer {
    /// Creates a framer that holds back at most `max_pending` bytes.
    ///
    /// A frame is always accepted into an empty backlog, whatever its size.
    pub fn new(max_pending: usize) -> Self {
        Self {
            backlog: Vec::new(),
            max_pending,
        }
    }

    /// Bytes encoded but not yet accepted by the transport.
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }

    /// Encodes `msg`, queues it behind any earlier frames and writes as much
    /// as the transport takes now.
    ///
    /// Returns the number of bytes written by this call.  `&mut T` gives the
    /// framer exclusive use of the transport, so frames never interleave.
    ///
    /// # Errors
    ///
    /// - [`FramerError::Backlogged`] if earlier bytes are still pending and
    ///   this frame would push the backlog over its limit.  Nothing is queued.
    /// - [`FramerError::Transport`] if the transport fails.
    pub fn send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        msg: &AgentMessage,
    ) -> Result<usize, FramerError> {
        let bytes = encode_agent_message(msg);
        let pending = self.backlog.len();
        if pending > 0 && pending + bytes.len() > self.max_pending {
            warn!(pending, frame = bytes.len(), limit = self.max_pending, "outbound backlog full");
            return Err(FramerError::Backlogged {
                pending,
                frame: bytes.len(),
                limit: self.max_pending,
            });
        }
        self.backlog.extend_from_slice(&bytes);
        trace!(message_type = %msg.message_type(), size = bytes.len(), "frame queued");
        self.flush(transport)
    }

    /// Writes pending bytes until the transport is full or the backlog is
    /// empty.  Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`FramerError::Transport`] if the transport fails.  The unsent bytes
    /// stay queued.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<usize, FramerError> {
        let mut written = 0;
        while !self.backlog.is_empty() {
            let capacity = transport.writable_capacity();
            if capacity == 0 {
                break;
            }
            let end = capacity.min(self.backlog.len());
            let n = transport.write(&self.backlog[..end])?.min(end);
            if n == 0 {
                break;
            }
            self.backlog.drain(..n);
            written += n;
        }
        if !self.backlog.is_empty() {
            trace!(written, pending = self.backlog.len(), "transport full; bytes held back");
        }
        Ok(written)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
