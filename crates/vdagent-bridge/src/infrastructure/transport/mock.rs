//! Recording transport for tests.
//!
//! Unlike the mockall-generated `MockTransport`, `RecordingTransport` keeps
//! every written byte and can decode them back into messages, which keeps
//! multi-step session tests readable.

use std::cell::RefCell;
use std::collections::VecDeque;

use vdagent_core::protocol::codec::{decode_message, decode_payload, ProtocolError};
use vdagent_core::protocol::messages::AgentMessage;
use vdagent_core::protocol::reassembly::StreamReassembler;

use crate::application::outbound::{Transport, TransportError};

/// A transport that records bytes and follows a capacity schedule.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    written: Vec<u8>,
    /// Capacities for successive write attempts; unbounded once empty.
    schedule: RefCell<VecDeque<usize>>,
    closed: bool,
}

impl RecordingTransport {
    /// An unbounded transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `i`th attempt sees `capacities[i]` bytes of space,
    /// then becomes unbounded.  A zero entry is one stalled attempt.
    pub fn with_schedule(capacities: impl IntoIterator<Item = usize>) -> Self {
        Self {
            schedule: RefCell::new(capacities.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Makes every later write fail with [`TransportError::Closed`].
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Every byte written and not yet taken.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Decodes and removes every complete message written so far.
    ///
    /// # Errors
    ///
    /// Returns the first framing or decoding error in the recorded output.
    pub fn take_messages(&mut self, selection_enabled: bool) -> Result<Vec<AgentMessage>, ProtocolError> {
        let mut reassembler = StreamReassembler::with_capacity(self.written.len());
        reassembler.push(&self.written);
        let mut messages = Vec::new();
        while let Some(frame) = reassembler.try_take_frame()? {
            let raw = decode_message(&frame.payload)?;
            messages.push(decode_payload(&raw, selection_enabled)?);
        }
        let consumed = self.written.len() - reassembler.buffered();
        self.written.drain(..consumed);
        Ok(messages)
    }
}

impl Transport for RecordingTransport {
    fn writable_capacity(&self) -> usize {
        let mut schedule = self.schedule.borrow_mut();
        match schedule.front().copied() {
            Some(0) => {
                schedule.pop_front();
                0
            }
            Some(n) => n,
            None => usize::MAX,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let n = bytes.len().min(self.writable_capacity());
        self.schedule.get_mut().pop_front();
        self.written.extend_from_slice(&bytes[..n]);
        Ok(n)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
