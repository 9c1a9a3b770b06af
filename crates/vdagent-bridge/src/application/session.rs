//! Session: the per-connection actor that ties the protocol layer to the
//! capability negotiator, the mouse bridge and the clipboard bridge.
//!
//! # One event at a time (for beginners)
//!
//! Everything that can change a session's state arrives as a
//! [`SessionEvent`]: bytes from the guest, broker notifications, pointer
//! events, sync ticks and the close signal.  The infrastructure layer
//! funnels all of them into one queue and calls [`Session::handle_event`]
//! for each in turn.  `handle_event` takes `&mut self`, so two events can
//! never touch the session concurrently, and it never waits on another
//! source before returning.
//!
//! # Error policy
//!
//! | condition                         | effect                               |
//! |-----------------------------------|--------------------------------------|
//! | incomplete frame                  | wait for more bytes                  |
//! | malformed / unknown / unsupported | log, skip the message, continue      |
//! | receive buffer overflow           | close the session, return the error  |
//! | transport full                    | hold bytes back, send on next flush  |
//! | outbound backlog over its limit   | close the session, return the error  |
//! | outbound write failure            | close the session, return the error  |
//! | clipboard registration failure    | close the session, return the error  |

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, info_span, trace, warn};
use vdagent_core::domain::clipboard::{PeerId, Selection};
use vdagent_core::domain::pointer::PointerEvent;
use vdagent_core::protocol::codec::{decode_message, decode_payload, Frame, ProtocolError};
use vdagent_core::protocol::messages::{AgentMessage, Capabilities};
use vdagent_core::protocol::reassembly::StreamReassembler;

use super::clipboard_bridge::{BrokerError, BrokerEvent, ClipboardBridge, ClipboardBroker, ClipboardPeer};
use super::mouse_bridge::{InputSource, MouseBridge};
use super::negotiate_caps::{CapabilityNegotiator, FeatureConfig, NegotiationEffect};
use super::outbound::{FramerError, OutboundFramer, Transport, DEFAULT_MAX_PENDING_BYTES};

/// Everything a session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Bytes read from the guest channel.
    Inbound(Vec<u8>),
    /// A notification from the clipboard broker.
    Broker(BrokerEvent),
    /// A host pointer event.
    Pointer(PointerEvent),
    /// The periodic pointer synchronisation tick.
    SyncTick,
    /// The guest channel closed.
    Closed,
}

/// Session-fatal errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The guest sent a chunk larger than the receive buffer.
    #[error("receive buffer overflow: {0}")]
    Overflow(#[source] ProtocolError),

    #[error("outbound write failed: {0}")]
    Outbound(#[from] FramerError),

    #[error("clipboard broker error: {0}")]
    Broker(#[from] BrokerError),

    /// An event arrived after the session closed.
    #[error("session closed")]
    Closed,
}

/// Static parameters of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The session's clipboard broker identity.
    pub peer_id: PeerId,
    /// Host features offered to the guest.
    pub features: FeatureConfig,
    /// Outbound bytes held back before the session gives up.  See
    /// [`OutboundFramer::new`].
    pub max_pending_bytes: usize,
}

impl SessionConfig {
    /// A config with a fresh peer identity and the default backlog limit.
    pub fn new(features: FeatureConfig) -> Self {
        Self {
            peer_id: PeerId::new(),
            features,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

/// One guest connection.
pub struct Session<T: Transport> {
    peer_id: PeerId,
    transport: T,
    framer: OutboundFramer,
    reassembler: StreamReassembler,
    negotiator: CapabilityNegotiator,
    mouse: Option<MouseBridge>,
    clipboard: ClipboardBridge,
    clipboard_sink: Arc<dyn ClipboardPeer>,
    closed: bool,
}

impl<T: Transport> Session<T> {
    /// Creates a session.  Nothing is sent until the guest announces its
    /// capabilities.
    ///
    /// `sink` is the handle the broker will use to deliver events back to
    /// this session once it registers.  The mouse bridge exists only when
    /// mouse forwarding is configured.
    pub fn new(
        config: SessionConfig,
        transport: T,
        broker: Arc<dyn ClipboardBroker>,
        sink: Arc<dyn ClipboardPeer>,
        input: Arc<dyn InputSource>,
    ) -> Self {
        let mouse = config.features.mouse.then(|| MouseBridge::new(input));
        Self {
            peer_id: config.peer_id,
            transport,
            framer: OutboundFramer::new(config.max_pending_bytes),
            reassembler: StreamReassembler::new(),
            negotiator: CapabilityNegotiator::new(config.features),
            mouse,
            clipboard: ClipboardBridge::new(config.peer_id, broker),
            clipboard_sink: sink,
            closed: false,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The guest's announced capabilities.
    pub fn remote_caps(&self) -> Capabilities {
        self.negotiator.remote_caps()
    }

    pub fn clipboard_registered(&self) -> bool {
        self.clipboard.is_registered()
    }

    /// Returns `true` while the pointer subscription is active.
    pub fn mouse_active(&self) -> bool {
        self.mouse.as_ref().is_some_and(MouseBridge::is_active)
    }

    /// Bytes buffered in the reassembler.
    pub fn buffered(&self) -> usize {
        self.reassembler.buffered()
    }

    /// Outbound bytes the transport has not taken yet.
    pub fn pending_output(&self) -> usize {
        self.framer.pending()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Event entry point ─────────────────────────────────────────────────────

    /// Writes held-back outbound bytes once the transport has room again.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`SessionError::Outbound`] if the transport fails; the session is
    /// closed.  [`SessionError::Closed`] after close.
    pub fn flush_output(&mut self) -> Result<usize, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        match self.framer.flush(&mut self.transport) {
            Ok(n) => Ok(n),
            Err(e) => {
                warn!(peer = %self.peer_id, error = %e, "outbound flush failed; closing");
                self.close();
                Err(e.into())
            }
        }
    }

    /// Processes one event to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] for session-fatal conditions; the session
    /// has already been closed when this happens.  Events after close
    /// return [`SessionError::Closed`].
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let span = info_span!("session", peer = %self.peer_id);
        let _guard = span.enter();

        let result = match event {
            SessionEvent::Inbound(bytes) => self.receive(&bytes).map(|_| ()),
            SessionEvent::Broker(event) => self.on_broker_event(event),
            SessionEvent::Pointer(event) => {
                if let Some(mouse) = self.mouse.as_mut() {
                    mouse.on_input_event(event);
                }
                Ok(())
            }
            SessionEvent::SyncTick => self.on_sync_tick(),
            SessionEvent::Closed => {
                self.close();
                Ok(())
            }
        };

        if let Err(e) = &result {
            warn!(error = %e, "session-fatal error; closing");
            self.close();
        }
        result
    }

    /// Feeds guest bytes into the reassembler and dispatches every complete
    /// frame.  Returns the number of frames dispatched.
    ///
    /// # Errors
    ///
    /// [`SessionError::Overflow`] if the guest declares a chunk larger than
    /// the receive buffer, or any outbound error raised while answering.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<usize, SessionError> {
        let mut input = bytes;
        let mut frames = 0;

        loop {
            let accepted = self.reassembler.push(input);
            input = &input[accepted..];

            let mut took_frame = false;
            while let Some(frame) = self.reassembler.try_take_frame().map_err(SessionError::Overflow)? {
                took_frame = true;
                frames += 1;
                self.dispatch_frame(&frame)?;
            }

            if input.is_empty() {
                break;
            }
            if accepted == 0 && !took_frame {
                // Full buffer that still holds no complete frame.
                return Err(SessionError::Overflow(ProtocolError::FrameTooLarge {
                    declared: self.reassembler.buffered(),
                    capacity: self.reassembler.capacity(),
                }));
            }
        }

        trace!(bytes = bytes.len(), frames, buffered = self.reassembler.buffered(), "inbound processed");
        Ok(frames)
    }

    // ── Inbound dispatch ──────────────────────────────────────────────────────

    fn dispatch_frame(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let raw = match decode_message(&frame.payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(port = frame.port, error = %e, "malformed message skipped");
                return Ok(());
            }
        };
        let msg = match decode_payload(&raw, self.negotiator.selection_enabled()) {
            Ok(msg) => msg,
            Err(e @ ProtocolError::UnsupportedMessage(_)) => {
                debug!(error = %e, "message not handled by the bridge; skipped");
                return Ok(());
            }
            Err(e) => {
                warn!(message_type = raw.message_type, error = %e, "undecodable message skipped");
                return Ok(());
            }
        };

        trace!(message_type = %msg.message_type(), "guest message");
        match msg {
            AgentMessage::AnnounceCapabilities(announce) => {
                let effects = self.negotiator.on_announce(&announce, self.clipboard.is_registered());
                for effect in effects {
                    self.apply(effect)?;
                }
                Ok(())
            }
            AgentMessage::MouseState(_) => {
                debug!("guest sent MOUSE_STATE; host never expects it, skipped");
                Ok(())
            }
            AgentMessage::ClipboardGrab(m) => {
                if self.clipboard_ready() {
                    let out = self.clipboard.on_guest_grab(guest_selection(m.selection), &m.types);
                    self.send_all(out)?;
                }
                Ok(())
            }
            AgentMessage::ClipboardRequest(m) => {
                if self.clipboard_ready() {
                    let selection_enabled = self.negotiator.selection_enabled();
                    let out = self.clipboard.on_guest_request(
                        guest_selection(m.selection),
                        m.data_type,
                        selection_enabled,
                    );
                    self.send_all(out)?;
                }
                Ok(())
            }
            AgentMessage::ClipboardData(m) => {
                if self.clipboard_ready() {
                    self.clipboard.on_guest_data(guest_selection(m.selection), m.data_type, m.data);
                }
                Ok(())
            }
            AgentMessage::ClipboardRelease(m) => {
                if self.clipboard_ready() {
                    let out = self.clipboard.on_guest_release(guest_selection(m.selection));
                    self.send_all(out)?;
                }
                Ok(())
            }
        }
    }

    fn clipboard_ready(&self) -> bool {
        let ready = self.clipboard.is_registered();
        if !ready {
            debug!("clipboard message before clipboard negotiation; ignored");
        }
        ready
    }

    fn apply(&mut self, effect: NegotiationEffect) -> Result<(), SessionError> {
        match effect {
            NegotiationEffect::SendCapabilities(reply) => {
                self.send(&AgentMessage::AnnounceCapabilities(reply))?;
            }
            NegotiationEffect::ActivateMouse => {
                if let Some(mouse) = self.mouse.as_mut() {
                    mouse.activate();
                }
            }
            NegotiationEffect::RegisterClipboard => {
                self.clipboard.register(Arc::clone(&self.clipboard_sink))?;
            }
        }
        Ok(())
    }

    // ── Other sources ─────────────────────────────────────────────────────────

    fn on_broker_event(&mut self, event: BrokerEvent) -> Result<(), SessionError> {
        let out = self
            .clipboard
            .on_broker_event(event, self.negotiator.selection_enabled());
        self.send_all(out)
    }

    fn on_sync_tick(&mut self) -> Result<(), SessionError> {
        let Some(mouse) = self.mouse.as_ref() else {
            return Ok(());
        };
        if !mouse.is_active() {
            return Ok(());
        }
        if self.framer.pending() > 0 {
            // The next tick carries the latest state anyway.
            trace!(pending = self.framer.pending(), "transport full; pointer tick skipped");
            return Ok(());
        }
        match mouse.on_sync_tick(self.negotiator.remote_caps()) {
            Some(state) => self.send(&AgentMessage::MouseState(state)),
            None => Ok(()),
        }
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    fn send(&mut self, msg: &AgentMessage) -> Result<(), SessionError> {
        self.framer.send(&mut self.transport, msg)?;
        Ok(())
    }

    fn send_all(&mut self, messages: Vec<AgentMessage>) -> Result<(), SessionError> {
        for msg in &messages {
            self.send(msg)?;
        }
        Ok(())
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    /// Tears the session down: drops buffered bytes, forgets the guest's
    /// capabilities, stops pointer forwarding and leaves the broker.
    /// Repeated calls are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.reassembler.reset();
        self.negotiator.reset();
        if let Some(mouse) = self.mouse.as_mut() {
            mouse.deactivate();
        }
        self.clipboard.unregister();
        self.closed = true;
        info!(peer = %self.peer_id, "session closed");
    }
}

/// Without the selection capability every clipboard message addresses the
/// clipboard selection.
fn guest_selection(selection: Option<Selection>) -> Selection {
    selection.unwrap_or(Selection::Clipboard)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
