//! Reassembly of chunks from an arbitrarily fragmented byte stream.
//!
//! # How framing works here (for beginners)
//!
//! The transport delivers bytes in whatever pieces it likes: one write may
//! contain half a chunk header, the next three complete chunks and a few
//! bytes of a fourth.  The [`StreamReassembler`] hides this.  Callers push
//! raw bytes in and pull complete [`Frame`]s out:
//!
//! ```text
//! loop {
//!     accepted = reassembler.push(&input)      // may accept only a prefix
//!     while let Some(frame) = reassembler.try_take_frame()? { handle(frame) }
//!     input = &input[accepted..]
//! }
//! ```
//!
//! Framing only looks at the chunk header (port + size).  A chunk whose
//! message is garbage still comes out as a `Frame`; rejecting it is the
//! message layer's job.
//!
//! The buffer is bounded.  A chunk header that declares more bytes than the
//! buffer can ever hold is reported as [`ProtocolError::FrameTooLarge`]
//! instead of silently dropping guest data.

use tracing::trace;

use crate::protocol::codec::{peek_chunk_header, Frame, ProtocolError};
use crate::protocol::messages::{CHUNK_HEADER_SIZE, MAX_MESSAGE_SIZE};

/// Bounded accumulation buffer that turns byte writes into complete frames.
///
/// # Examples
///
/// ```rust
/// use vdagent_core::protocol::codec::encode_frame;
/// use vdagent_core::protocol::reassembly::StreamReassembler;
///
/// let wire = encode_frame(1, b"payload");
/// let mut reassembler = StreamReassembler::new();
///
/// assert_eq!(reassembler.push(&wire[..5]), 5);
/// assert_eq!(reassembler.try_take_frame().unwrap(), None);
///
/// reassembler.push(&wire[5..]);
/// let frame = reassembler.try_take_frame().unwrap().unwrap();
/// assert_eq!(frame.payload, b"payload");
/// ```
#[derive(Debug)]
pub struct StreamReassembler {
    buf: Vec<u8>,
    capacity: usize,
}

impl StreamReassembler {
    /// Creates a reassembler sized for the largest legal chunk.
    pub fn new() -> Self {
        Self::with_capacity(MAX_MESSAGE_SIZE)
    }

    /// Creates a reassembler holding at most `capacity` bytes.
    ///
    /// `capacity` is raised to the chunk header size if smaller, so that a
    /// header can always be inspected.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(CHUNK_HEADER_SIZE);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends as much of `bytes` as fits and returns how many were accepted.
    ///
    /// Never blocks.  The caller re-offers `bytes[accepted..]` after taking
    /// frames out.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let accepted = bytes.len().min(self.capacity - self.buf.len());
        self.buf.extend_from_slice(&bytes[..accepted]);
        trace!(offered = bytes.len(), accepted, buffered = self.buf.len(), "reassembler push");
        accepted
    }

    /// Extracts the next complete frame, if one is fully buffered.
    ///
    /// Returns `Ok(None)` while only part of a frame is present.  Consumed
    /// bytes are discarded and the remainder moves to the front of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] as soon as a buffered chunk
    /// header declares a chunk larger than the capacity.  The buffer is left
    /// untouched; the session is expected to close.
    pub fn try_take_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(header) = peek_chunk_header(&self.buf) else {
            return Ok(None);
        };

        let total = CHUNK_HEADER_SIZE + header.size as usize;
        if total > self.capacity {
            return Err(ProtocolError::FrameTooLarge {
                declared: total,
                capacity: self.capacity,
            });
        }
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload = self.buf[CHUNK_HEADER_SIZE..total].to_vec();
        self.buf.drain(..total);
        trace!(port = header.port, size = header.size, remaining = self.buf.len(), "frame reassembled");

        Ok(Some(Frame {
            port: header.port,
            payload,
        }))
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Maximum number of bytes the buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards everything buffered.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}
