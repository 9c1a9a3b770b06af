//! Integration tests for the bridge: a real session wired to the in-memory
//! broker, the host clipboard peer and a recording transport.
//!
//! Guest traffic is produced with the same codec the guest agent speaks, and
//! everything the bridge writes back is decoded and compared as typed
//! messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use vdagent_bridge::application::clipboard_bridge::{BrokerError, BrokerEvent, ClipboardBroker};
use vdagent_bridge::application::negotiate_caps::FeatureConfig;
use vdagent_bridge::application::session::{Session, SessionConfig, SessionError, SessionEvent};
use vdagent_bridge::infrastructure::clipboard::{
    broker::InMemoryClipboardBroker, host::HostClipboard, mock::QueuedPeer,
};
use vdagent_bridge::infrastructure::input_source::StaticInputSource;
use vdagent_bridge::infrastructure::transport::{channel_transport, RecordingTransport};
use vdagent_bridge::infrastructure::{serve, ServerContext};
use vdagent_core::domain::pointer::{Axis, DisplaySize};
use vdagent_core::protocol::codec::{decode_message, decode_payload, encode_agent_message, encode_frame};
use vdagent_core::protocol::messages::{
    AnnounceCapabilitiesMessage, ClipboardDataMessage, ClipboardGrabMessage,
    ClipboardRequestMessage, MouseButtons, MouseStateMessage, WireClipboardType, CLIENT_PORT,
    MAX_MESSAGE_SIZE,
};
use vdagent_core::{
    AgentMessage, Capabilities, ClipboardInfo, ClipboardType, PeerId, PointerButton, PointerEvent,
    Selection, StreamReassembler,
};

const CLIPBOARD_CAPS: u32 = Capabilities::CLIPBOARD_BY_DEMAND | Capabilities::CLIPBOARD_SELECTION;
const ALL_FEATURES: FeatureConfig = FeatureConfig { mouse: true, clipboard: true };

// ── Harness ───────────────────────────────────────────────────────────────────

/// One session plus the shared services around it.
struct Harness {
    session: Session<RecordingTransport>,
    broker: Arc<InMemoryClipboardBroker>,
    inbox: Arc<QueuedPeer>,
    input: Arc<StaticInputSource>,
}

impl Harness {
    fn new(features: FeatureConfig) -> Self {
        let broker = Arc::new(InMemoryClipboardBroker::new());
        let inbox = Arc::new(QueuedPeer::new());
        let input = Arc::new(StaticInputSource::new(DisplaySize::new(1024, 768)));
        let session = Session::new(
            SessionConfig::new(features),
            RecordingTransport::new(),
            broker.clone(),
            inbox.clone(),
            input.clone(),
        );
        Self { session, broker, inbox, input }
    }

    /// Sends `msg` from the guest.
    fn guest_sends(&mut self, msg: AgentMessage) {
        self.session
            .handle_event(SessionEvent::Inbound(encode_agent_message(&msg)))
            .expect("guest message must not be fatal");
    }

    fn announce(&mut self, request: bool, caps: u32) {
        self.guest_sends(AgentMessage::AnnounceCapabilities(AnnounceCapabilitiesMessage::new(
            request,
            Capabilities(caps),
        )));
    }

    /// Delivers every queued broker notification to the session.
    fn pump_broker(&mut self) {
        for event in self.inbox.drain() {
            self.session
                .handle_event(SessionEvent::Broker(event))
                .expect("broker event must not be fatal");
        }
    }

    /// Decodes and clears everything the session wrote to the guest.
    fn sent(&mut self) -> Vec<AgentMessage> {
        self.session
            .transport_mut()
            .take_messages(true)
            .expect("bridge output must decode")
    }
}

fn grab(selection: Selection) -> AgentMessage {
    AgentMessage::ClipboardGrab(ClipboardGrabMessage {
        selection: Some(selection),
        types: vec![WireClipboardType::Utf8Text as u32],
    })
}

fn request(selection: Selection) -> AgentMessage {
    AgentMessage::ClipboardRequest(ClipboardRequestMessage {
        selection: Some(selection),
        data_type: WireClipboardType::Utf8Text,
    })
}

fn data(selection: Selection, bytes: &[u8]) -> AgentMessage {
    AgentMessage::ClipboardData(ClipboardDataMessage {
        selection: Some(selection),
        data_type: WireClipboardType::Utf8Text,
        data: bytes.to_vec(),
    })
}

/// Registers a second broker peer that owns nothing yet.
fn other_peer(broker: &InMemoryClipboardBroker) -> (PeerId, Arc<QueuedPeer>) {
    let id = PeerId::new();
    let peer = Arc::new(QueuedPeer::new());
    broker.register_peer(id, peer.clone()).unwrap();
    (id, peer)
}

// ── Capability negotiation and pointer ────────────────────────────────────────

#[test]
fn test_announce_reply_then_tick_sends_scaled_pointer_state() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);

    // Act
    h.announce(true, Capabilities::MOUSE_STATE);
    let reply = h.sent();
    h.session
        .handle_event(SessionEvent::Pointer(PointerEvent::Absolute { axis: Axis::X, value: 0x4000 }))
        .unwrap();
    h.session
        .handle_event(SessionEvent::Pointer(PointerEvent::Absolute { axis: Axis::Y, value: 0x4000 }))
        .unwrap();
    h.session.handle_event(SessionEvent::SyncTick).unwrap();

    // Assert
    assert_eq!(
        reply,
        vec![AgentMessage::AnnounceCapabilities(AnnounceCapabilitiesMessage::new(
            false,
            ALL_FEATURES.host_capabilities()
        ))]
    );
    assert!(h.input.is_active());
    assert_eq!(
        h.sent(),
        vec![AgentMessage::MouseState(MouseStateMessage {
            x: 512,
            y: 384,
            buttons: MouseButtons::default(),
            display_id: 0,
        })]
    );
}

#[test]
fn test_pointer_events_coalesce_into_one_state_per_tick() {
    let mut h = Harness::new(ALL_FEATURES);
    h.announce(false, Capabilities::MOUSE_STATE);

    for value in [100, 2000, 30000] {
        h.session
            .handle_event(SessionEvent::Pointer(PointerEvent::Absolute { axis: Axis::X, value }))
            .unwrap();
    }
    h.session
        .handle_event(SessionEvent::Pointer(PointerEvent::Button { button: PointerButton::Left, down: true }))
        .unwrap();
    h.session.handle_event(SessionEvent::SyncTick).unwrap();

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    let AgentMessage::MouseState(state) = &sent[0] else {
        panic!("expected MOUSE_STATE, got {sent:?}");
    };
    assert!(state.buttons.contains(MouseButtons::LEFT));
}

#[test]
fn test_no_mouse_state_without_mouse_capability() {
    let mut h = Harness::new(ALL_FEATURES);

    h.session.handle_event(SessionEvent::SyncTick).unwrap();
    h.announce(false, CLIPBOARD_CAPS);
    h.session.handle_event(SessionEvent::SyncTick).unwrap();

    assert!(h.sent().is_empty());
    assert!(!h.input.is_active());
}

#[test]
fn test_clipboard_registration_requires_both_bits_and_local_config() {
    // Arrange
    let mut partial = Harness::new(ALL_FEATURES);
    let mut unconfigured = Harness::new(FeatureConfig { mouse: true, clipboard: false });
    let mut full = Harness::new(ALL_FEATURES);

    // Act
    partial.announce(false, Capabilities::CLIPBOARD_BY_DEMAND);
    unconfigured.announce(false, CLIPBOARD_CAPS);
    full.announce(false, CLIPBOARD_CAPS);

    // Assert
    assert_eq!(partial.broker.peer_count(), 0);
    assert_eq!(unconfigured.broker.peer_count(), 0);
    assert_eq!(full.broker.peer_count(), 1);
    assert!(full.session.clipboard_registered());
}

#[test]
fn test_clipboard_messages_before_registration_are_ignored() {
    let mut h = Harness::new(ALL_FEATURES);

    h.guest_sends(AgentMessage::ClipboardGrab(ClipboardGrabMessage {
        selection: None,
        types: vec![WireClipboardType::Utf8Text as u32],
    }));

    assert!(h.broker.current(Selection::Clipboard).is_none());
}

// ── Clipboard: guest owns the selection ───────────────────────────────────────

#[test]
fn test_guest_grab_is_published_and_never_echoed() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    h.announce(false, CLIPBOARD_CAPS);

    // Act
    h.guest_sends(grab(Selection::Clipboard));
    h.pump_broker();

    // Assert
    let current = h.broker.current(Selection::Clipboard).expect("grab published");
    assert!(current.is_owned_by(h.session.peer_id()));
    assert!(current.is_available(ClipboardType::Text));
    assert!(h.sent().is_empty(), "self-originated update must not reach the guest");
}

#[test]
fn test_primary_grab_answers_host_request_only_after_guest_sends_data() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    let host = HostClipboard::new(h.broker.clone());
    host.register().unwrap();
    h.announce(false, CLIPBOARD_CAPS);

    // Act: guest grabs PRIMARY, the host asks for the text.
    h.guest_sends(grab(Selection::Primary));
    h.pump_broker();
    host.pump();
    h.pump_broker();
    let asked = h.sent();
    let text_before = host.text(Selection::Primary);

    // Act: the guest answers.
    h.guest_sends(data(Selection::Primary, b"hi"));
    h.pump_broker();
    host.pump();

    // Assert
    assert_eq!(asked, vec![request(Selection::Primary)]);
    assert_eq!(text_before, None, "no data before the guest sends it");
    assert_eq!(host.text(Selection::Primary).as_deref(), Some("hi"));
    assert!(h.sent().is_empty());
}

#[test]
fn test_guest_release_resets_selection_for_other_peers() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    h.announce(false, CLIPBOARD_CAPS);
    let (_, watcher) = other_peer(&h.broker);
    h.guest_sends(grab(Selection::Secondary));
    watcher.drain();

    // Act
    h.guest_sends(AgentMessage::ClipboardRelease(
        vdagent_core::protocol::messages::ClipboardReleaseMessage { selection: Some(Selection::Secondary) },
    ));

    // Assert
    let events = watcher.drain();
    assert_eq!(events.len(), 1);
    let BrokerEvent::Update(info) = &events[0] else {
        panic!("expected an update, got {events:?}");
    };
    assert_eq!(info.owner(), None);
}

// ── Clipboard: another peer owns the selection ────────────────────────────────

#[test]
fn test_request_then_data_sends_exactly_one_clipboard_message() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    h.announce(false, CLIPBOARD_CAPS);
    let (owner, owner_inbox) = other_peer(&h.broker);
    let info = h.broker.publish(
        ClipboardInfo::new(Some(owner), Selection::Clipboard).with_available(ClipboardType::Text),
    );
    h.pump_broker();
    let grabs = h.sent();
    owner_inbox.drain();

    // Act
    h.guest_sends(request(Selection::Clipboard));
    let routed = owner_inbox.drain();
    h.broker
        .set_data(owner, &info, ClipboardType::Text, b"payload".to_vec())
        .unwrap();
    h.pump_broker();
    let first = h.sent();
    h.pump_broker();

    // Assert
    assert_eq!(grabs, vec![grab(Selection::Clipboard)]);
    assert!(matches!(
        routed.as_slice(),
        [BrokerEvent::Request { data_type: ClipboardType::Text, .. }]
    ));
    assert_eq!(first, vec![data(Selection::Clipboard, b"payload")]);
    assert!(h.sent().is_empty());
}

#[test]
fn test_new_grab_discards_outstanding_request() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    h.announce(false, CLIPBOARD_CAPS);
    let (owner, _) = other_peer(&h.broker);
    let old = h.broker.publish(
        ClipboardInfo::new(Some(owner), Selection::Clipboard).with_available(ClipboardType::Text),
    );
    h.pump_broker();
    h.guest_sends(request(Selection::Clipboard));
    h.sent();

    // Act
    h.broker.publish(
        ClipboardInfo::new(Some(owner), Selection::Clipboard).with_available(ClipboardType::Text),
    );
    h.pump_broker();
    let late = h.broker.set_data(owner, &old, ClipboardType::Text, b"late".to_vec());
    let stale = Arc::new(old.as_ref().clone().with_data(ClipboardType::Text, b"late".to_vec()));
    h.session.handle_event(SessionEvent::Broker(BrokerEvent::Update(stale))).unwrap();

    // Assert
    assert!(matches!(late, Err(BrokerError::StaleGeneration { .. })));
    assert_eq!(h.sent(), vec![grab(Selection::Clipboard)], "only the new grab reaches the guest");
}

#[test]
fn test_host_text_is_served_from_cache() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    let host = HostClipboard::new(h.broker.clone());
    host.register().unwrap();
    h.announce(false, CLIPBOARD_CAPS);

    // Act
    host.set_text(Selection::Clipboard, "from host");
    h.pump_broker();
    h.guest_sends(request(Selection::Clipboard));

    // Assert
    assert_eq!(
        h.sent(),
        vec![grab(Selection::Clipboard), data(Selection::Clipboard, b"from host")]
    );
}

// ── Error policy and cancellation ─────────────────────────────────────────────

#[test]
fn test_malformed_and_unknown_messages_are_skipped() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    let mut stream = encode_frame(CLIENT_PORT, &[0u8; 5]);
    let mut unknown = encode_agent_message(&AgentMessage::AnnounceCapabilities(
        AnnounceCapabilitiesMessage::new(false, Capabilities::empty()),
    ));
    unknown[12..16].copy_from_slice(&999u32.to_le_bytes());
    stream.extend(unknown);
    stream.extend(encode_agent_message(&AgentMessage::AnnounceCapabilities(
        AnnounceCapabilitiesMessage::new(true, Capabilities(Capabilities::MOUSE_STATE)),
    )));

    // Act
    let result = h.session.handle_event(SessionEvent::Inbound(stream));

    // Assert
    assert!(result.is_ok());
    assert!(!h.session.is_closed());
    assert_eq!(h.sent().len(), 1, "only the valid announce is answered");
}

#[test]
fn test_overflow_is_fatal_not_truncated() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    h.announce(false, CLIPBOARD_CAPS | Capabilities::MOUSE_STATE);
    let oversized = encode_frame(CLIENT_PORT, &vec![0u8; MAX_MESSAGE_SIZE]);

    // Act
    let result = h.session.handle_event(SessionEvent::Inbound(oversized));

    // Assert
    assert!(matches!(result, Err(SessionError::Overflow(_))));
    assert!(h.session.is_closed());
    assert_eq!(h.broker.peer_count(), 0);
}

#[test]
fn test_close_resets_state_and_releases_guest_selections() {
    // Arrange
    let mut h = Harness::new(ALL_FEATURES);
    let (_, watcher) = other_peer(&h.broker);
    h.announce(false, CLIPBOARD_CAPS | Capabilities::MOUSE_STATE);
    h.guest_sends(grab(Selection::Clipboard));
    h.session.handle_event(SessionEvent::Inbound(vec![1, 0, 0])).unwrap();
    watcher.drain();

    // Act
    h.session.handle_event(SessionEvent::Closed).unwrap();

    // Assert
    assert_eq!(h.session.buffered(), 0);
    assert_eq!(h.session.remote_caps(), Capabilities::empty());
    assert!(!h.input.is_active());
    assert_eq!(h.broker.peer_count(), 1);
    assert_eq!(h.broker.current(Selection::Clipboard).and_then(|i| i.owner()), None);
    assert_eq!(watcher.drain().len(), 1);
    assert!(matches!(h.session.handle_event(SessionEvent::SyncTick), Err(SessionError::Closed)));
}

// ── TCP server ────────────────────────────────────────────────────────────────

/// Reads typed messages from a guest-side socket.
struct GuestConn {
    stream: TcpStream,
    reassembler: StreamReassembler,
    pending: Vec<u8>,
}

impl GuestConn {
    async fn next_message(&mut self) -> AgentMessage {
        loop {
            let accepted = self.reassembler.push(&self.pending);
            self.pending.drain(..accepted);
            if let Some(frame) = self.reassembler.try_take_frame().unwrap() {
                let raw = decode_message(&frame.payload).unwrap();
                return decode_payload(&raw, true).unwrap();
            }
            let mut buf = [0u8; 512];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "bridge closed the connection");
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    async fn wait_for(&mut self, pred: impl Fn(&AgentMessage) -> bool) -> AgentMessage {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let msg = self.next_message().await;
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("expected message did not arrive")
    }
}

#[tokio::test]
async fn test_server_runs_a_full_guest_session() {
    // Arrange
    let broker: Arc<dyn ClipboardBroker> = Arc::new(InMemoryClipboardBroker::new());
    let host = HostClipboard::new(broker.clone());
    host.register().unwrap();
    let host_task = tokio::spawn(Arc::clone(&host).run());
    let (pointer, _) = broadcast::channel(16);
    // A budget smaller than most replies keeps every frame partly held back
    // until the writer task drains the socket.
    let ctx = Arc::new(ServerContext {
        broker,
        display: DisplaySize::new(1024, 768),
        pointer: pointer.clone(),
        features: ALL_FEATURES,
        write_budget: 16,
        max_pending_bytes: 64 * 1024,
        stall_timeout: Duration::from_secs(5),
        sync_interval: Duration::from_millis(10),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(serve(listener, ctx, Arc::clone(&running)));

    let mut guest = GuestConn {
        stream: TcpStream::connect(addr).await.unwrap(),
        reassembler: StreamReassembler::new(),
        pending: Vec::new(),
    };

    // Act + Assert: negotiation
    let announce = AgentMessage::AnnounceCapabilities(AnnounceCapabilitiesMessage::new(
        true,
        Capabilities(Capabilities::MOUSE_STATE | CLIPBOARD_CAPS),
    ));
    guest.stream.write_all(&encode_agent_message(&announce)).await.unwrap();
    guest
        .wait_for(|m| matches!(m, AgentMessage::AnnounceCapabilities(a) if !a.request))
        .await;

    // Act + Assert: host copy reaches the guest as a grab
    host.set_text(Selection::Clipboard, "from host");
    let grabbed = guest.wait_for(|m| matches!(m, AgentMessage::ClipboardGrab(_))).await;
    assert_eq!(grabbed, grab(Selection::Clipboard));

    // Act + Assert: pointer position reaches the guest on a tick
    pointer
        .send(PointerEvent::Absolute { axis: Axis::X, value: 0x4000 })
        .unwrap();
    guest
        .wait_for(|m| matches!(m, AgentMessage::MouseState(s) if s.x == 512))
        .await;

    // Cleanup
    drop(guest);
    running.store(false, Ordering::Relaxed);
    server.await.unwrap();
    host_task.abort();
}

// ── Output backpressure ───────────────────────────────────────────────────────

#[tokio::test(flavor = "current_thread")]
async fn test_reply_larger_than_write_budget_reaches_guest_on_one_thread() {
    // Arrange
    let broker = Arc::new(InMemoryClipboardBroker::new());
    let (transport, writer) = channel_transport(16);
    let drained = transport.drained();
    let (sink, mut guest_side) = tokio::io::duplex(256);
    let writer_task = tokio::spawn(writer.run(sink));
    let mut session = Session::new(
        SessionConfig::new(ALL_FEATURES),
        transport,
        broker,
        Arc::new(QueuedPeer::new()),
        Arc::new(StaticInputSource::new(DisplaySize::new(1024, 768))),
    );
    let announce = AgentMessage::AnnounceCapabilities(AnnounceCapabilitiesMessage::new(
        true,
        Capabilities(Capabilities::MOUSE_STATE),
    ));

    // Act: the 36-byte reply only partly fits, the rest waits for the writer
    session
        .handle_event(SessionEvent::Inbound(encode_agent_message(&announce)))
        .unwrap();
    assert_eq!(session.pending_output(), 20);
    while session.pending_output() > 0 {
        tokio::time::timeout(Duration::from_secs(5), drained.notified())
            .await
            .expect("writer never drained the transport");
        session.flush_output().unwrap();
    }
    let mut bytes = vec![0u8; 36];
    guest_side.read_exact(&mut bytes).await.unwrap();

    // Assert
    assert!(!session.is_closed());
    let mut reassembler = StreamReassembler::new();
    reassembler.push(&bytes);
    let frame = reassembler.try_take_frame().unwrap().expect("one whole frame");
    let reply = decode_payload(&decode_message(&frame.payload).unwrap(), false).unwrap();
    assert!(matches!(reply, AgentMessage::AnnounceCapabilities(a) if !a.request));

    // Cleanup
    drop(session);
    writer_task.await.unwrap().unwrap();
}
