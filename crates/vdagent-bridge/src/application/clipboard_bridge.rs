//! ClipboardBridge: per-selection clipboard state machine between the guest
//! and the host clipboard broker.
//!
//! # Two event sources (for beginners)
//!
//! The bridge reacts to two streams that must never be confused:
//!
//! - **Broker events** ([`BrokerEvent`]) tell the bridge that some peer on the
//!   host changed a selection, delivered data, or wants data the guest owns.
//! - **Guest messages** (GRAB, REQUEST, CLIPBOARD, RELEASE) tell the bridge
//!   what the guest did.
//!
//! Guest actions are published to the broker under the session's own
//! [`PeerId`].  The broker fans every publish out to every peer, the
//! publisher included, so the bridge sees its own changes come back.  It
//! recognises them by comparing the snapshot owner with its own identity and
//! never echoes them to the guest.
//!
//! # Generations
//!
//! Snapshots are compared by generation, not by pointer:
//!
//! | incoming vs. current | meaning                  | action                          |
//! |----------------------|--------------------------|---------------------------------|
//! | higher               | new ownership            | adopt, clear pending, GRAB      |
//! | higher, no owner     | selection released       | adopt, clear pending, RELEASE   |
//! | equal, own snapshot  | echo of own change       | ignore                          |
//! | equal                | data arrived             | adopt, send pending data        |
//! | lower                | stale, already superseded| ignore                          |
//!
//! The bridge adopts its own publishes immediately, so the broker's copy of
//! the same publish arrives later with an equal generation and is ignored as
//! a self-update.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, trace, warn};
use vdagent_core::domain::clipboard::{
    ClipboardInfo, ClipboardType, ClipboardTypeSet, PeerId, Selection,
};
use vdagent_core::protocol::messages::{
    AgentMessage, ClipboardDataMessage, ClipboardGrabMessage, ClipboardReleaseMessage,
    ClipboardRequestMessage, WireClipboardType,
};

// ── Broker port ───────────────────────────────────────────────────────────────

/// Errors reported by a [`ClipboardBroker`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The peer identity is already registered.
    #[error("peer {0} is already registered")]
    DuplicatePeer(PeerId),

    /// Data was offered by a peer that does not own the selection.
    #[error("peer {peer} does not own the {selection} selection")]
    NotOwner { peer: PeerId, selection: Selection },

    /// Data was offered for an ownership that has since been replaced.
    #[error("stale {selection} generation {offered}, current is {current}")]
    StaleGeneration {
        selection: Selection,
        offered: u64,
        current: u64,
    },
}

/// A notification the broker delivers to a registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A selection has a new snapshot (new owner, release, or data arrival).
    Update(Arc<ClipboardInfo>),
    /// Another peer wants data of `data_type` from a snapshot this peer owns.
    Request {
        info: Arc<ClipboardInfo>,
        data_type: ClipboardType,
    },
}

/// Receiving side of a broker registration.
///
/// The broker may call `deliver` while holding its own lock, so
/// implementations must only queue the event and return.  Calling back into
/// the broker from `deliver` deadlocks.
pub trait ClipboardPeer: Send + Sync {
    fn deliver(&self, event: BrokerEvent);
}

/// Port to the shared clipboard broker.
pub trait ClipboardBroker: Send + Sync {
    /// Registers `peer`; every later event is delivered to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DuplicatePeer`] if `peer` is already registered.
    fn register_peer(&self, peer: PeerId, sink: Arc<dyn ClipboardPeer>) -> Result<(), BrokerError>;

    /// Unregisters `peer`, releasing every selection it owns.
    fn unregister_peer(&self, peer: PeerId);

    /// Publishes a new ownership snapshot and returns it stamped with a
    /// fresh generation.
    fn publish(&self, info: ClipboardInfo) -> Arc<ClipboardInfo>;

    /// The broker's current snapshot for `selection`.
    fn current(&self, selection: Selection) -> Option<Arc<ClipboardInfo>>;

    /// Asks the owner of `info` for data of `data_type`.  The answer arrives
    /// later as a [`BrokerEvent::Update`] with the same generation.
    fn request(&self, info: &ClipboardInfo, data_type: ClipboardType);

    /// Delivers data for a snapshot `peer` owns.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotOwner`] or [`BrokerError::StaleGeneration`]
    /// when the data does not belong to the current ownership.
    fn set_data(
        &self,
        peer: PeerId,
        info: &ClipboardInfo,
        data_type: ClipboardType,
        data: Vec<u8>,
    ) -> Result<Arc<ClipboardInfo>, BrokerError>;
}

// ── Per-selection state ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SelectionState {
    current: Option<Arc<ClipboardInfo>>,
    pending: ClipboardTypeSet,
}

impl SelectionState {
    fn adopt(&mut self, info: Arc<ClipboardInfo>) {
        self.current = Some(info);
        self.pending.clear();
    }
}

/// Selection field for an outbound message.
///
/// Returns `None` when the guest cannot address `selection`: without the
/// selection capability only the clipboard selection exists on the wire.
fn wire_selection(selection: Selection, selection_enabled: bool) -> Option<Option<Selection>> {
    if selection_enabled {
        Some(Some(selection))
    } else if selection == Selection::Clipboard {
        Some(None)
    } else {
        None
    }
}

// ── Use case ──────────────────────────────────────────────────────────────────

/// The Clipboard Bridge use case for one session.
pub struct ClipboardBridge {
    peer: PeerId,
    broker: Arc<dyn ClipboardBroker>,
    selections: [SelectionState; Selection::COUNT],
    registered: bool,
}

impl ClipboardBridge {
    /// Creates an unregistered bridge acting as `peer`.
    pub fn new(peer: PeerId, broker: Arc<dyn ClipboardBroker>) -> Self {
        Self {
            peer,
            broker,
            selections: Default::default(),
            registered: false,
        }
    }

    /// This session's broker identity.
    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    /// Returns `true` once registered with the broker.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// The snapshot the bridge currently tracks for `selection`.
    pub fn current(&self, selection: Selection) -> Option<&Arc<ClipboardInfo>> {
        self.selections[selection.index()].current.as_ref()
    }

    /// Types requested from the broker and not yet delivered.
    pub fn pending(&self, selection: Selection) -> ClipboardTypeSet {
        self.selections[selection.index()].pending
    }

    /// Registers with the broker.  A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the broker's registration error.
    pub fn register(&mut self, sink: Arc<dyn ClipboardPeer>) -> Result<(), BrokerError> {
        if self.registered {
            return Ok(());
        }
        self.broker.register_peer(self.peer, sink)?;
        self.registered = true;
        info!(peer = %self.peer, "registered as clipboard peer");
        Ok(())
    }

    /// Unregisters from the broker and drops every held snapshot.
    pub fn unregister(&mut self) {
        if !self.registered {
            return;
        }
        self.broker.unregister_peer(self.peer);
        self.registered = false;
        self.selections = Default::default();
        info!(peer = %self.peer, "unregistered clipboard peer");
    }

    // ── Broker events ─────────────────────────────────────────────────────────

    /// Handles one broker notification and returns the messages for the guest.
    pub fn on_broker_event(&mut self, event: BrokerEvent, selection_enabled: bool) -> Vec<AgentMessage> {
        if !self.registered {
            trace!("broker event after unregistering; ignored");
            return Vec::new();
        }
        match event {
            BrokerEvent::Update(info) => self.on_update(info, selection_enabled),
            BrokerEvent::Request { info, data_type } => {
                self.on_request_from_host(&info, data_type, selection_enabled)
            }
        }
    }

    fn on_update(&mut self, info: Arc<ClipboardInfo>, selection_enabled: bool) -> Vec<AgentMessage> {
        let selection = info.selection();
        let self_update = info.is_owned_by(self.peer);
        let state = &mut self.selections[selection.index()];
        let current_generation = state.current.as_ref().map(|c| c.generation());

        match current_generation {
            Some(current) if info.generation() < current => {
                trace!(%selection, generation = info.generation(), current, "stale clipboard update ignored");
                Vec::new()
            }
            Some(current) if info.generation() == current => {
                // Own publishes and own data are adopted when made; the
                // broker's copy may be older than what the bridge holds.
                if self_update {
                    trace!(%selection, generation = current, "self-update ignored");
                    return Vec::new();
                }
                state.current = Some(Arc::clone(&info));
                let Some(selection_field) = wire_selection(selection, selection_enabled) else {
                    return Vec::new();
                };
                let mut out = Vec::new();
                for ty in state.pending.iter().collect::<Vec<_>>() {
                    if info.data(ty).is_none() {
                        continue;
                    }
                    state.pending.remove(ty);
                    if let Some(msg) = data_message(&info, ty, selection_field) {
                        debug!(%selection, data_type = %ty, size = info.slot(ty).size(), "sending requested clipboard data");
                        out.push(msg);
                    }
                }
                out
            }
            _ => {
                debug!(
                    %selection,
                    generation = info.generation(),
                    owner = ?info.owner(),
                    self_update,
                    "new clipboard ownership"
                );
                state.adopt(Arc::clone(&info));
                if self_update {
                    return Vec::new();
                }
                let Some(selection_field) = wire_selection(selection, selection_enabled) else {
                    debug!(%selection, "guest cannot address selection; not forwarded");
                    return Vec::new();
                };
                if info.owner().is_none() {
                    vec![AgentMessage::ClipboardRelease(ClipboardReleaseMessage {
                        selection: selection_field,
                    })]
                } else {
                    vec![grab_message(&info, selection_field)]
                }
            }
        }
    }

    fn on_request_from_host(
        &mut self,
        info: &ClipboardInfo,
        data_type: ClipboardType,
        selection_enabled: bool,
    ) -> Vec<AgentMessage> {
        if !info.is_owned_by(self.peer) {
            debug!(selection = %info.selection(), "request for a selection the guest does not own; ignored");
            return Vec::new();
        }
        let Some(wire_type) = WireClipboardType::from_host(data_type) else {
            debug!(%data_type, "no wire type for requested clipboard type");
            return Vec::new();
        };
        let Some(selection) = wire_selection(info.selection(), selection_enabled) else {
            return Vec::new();
        };
        debug!(selection = %info.selection(), %data_type, "requesting clipboard data from guest");
        vec![AgentMessage::ClipboardRequest(ClipboardRequestMessage {
            selection,
            data_type: wire_type,
        })]
    }

    // ── Guest messages ────────────────────────────────────────────────────────

    /// CLIPBOARD_GRAB: the guest owns `selection` and offers `types`.
    pub fn on_guest_grab(&mut self, selection: Selection, types: &[u32]) -> Vec<AgentMessage> {
        let mut info = ClipboardInfo::new(Some(self.peer), selection);
        for code in types {
            match WireClipboardType::try_from(*code).ok().and_then(WireClipboardType::host_type) {
                Some(ty) => info = info.with_available(ty),
                None => trace!(code, "grab type not supported by host; ignored"),
            }
        }
        let published = self.broker.publish(info);
        debug!(%selection, generation = published.generation(), "guest grabbed selection");
        self.selections[selection.index()].adopt(published);
        Vec::new()
    }

    /// CLIPBOARD_REQUEST: the guest wants data of `data_type` from the host.
    pub fn on_guest_request(
        &mut self,
        selection: Selection,
        data_type: WireClipboardType,
        selection_enabled: bool,
    ) -> Vec<AgentMessage> {
        let Some(ty) = data_type.host_type() else {
            debug!(%data_type, "guest requested unsupported clipboard type");
            return Vec::new();
        };
        let state = &mut self.selections[selection.index()];
        let Some(info) = state.current.as_ref() else {
            debug!(%selection, "guest requested an empty selection");
            return Vec::new();
        };
        if !info.is_available(ty) || info.is_owned_by(self.peer) {
            debug!(%selection, %data_type, "request cannot be served by the host");
            return Vec::new();
        }

        if info.data(ty).is_some() {
            let Some(selection_field) = wire_selection(selection, selection_enabled) else {
                return Vec::new();
            };
            return data_message(info, ty, selection_field).into_iter().collect();
        }

        state.pending.insert(ty);
        debug!(%selection, %data_type, generation = info.generation(), "fetching clipboard data from owner");
        self.broker.request(info, ty);
        Vec::new()
    }

    /// CLIPBOARD: the guest delivers data for a selection it owns.
    pub fn on_guest_data(&mut self, selection: Selection, data_type: WireClipboardType, data: Vec<u8>) {
        let Some(ty) = data_type.host_type() else {
            debug!(%data_type, "guest sent unsupported clipboard type");
            return;
        };
        let state = &mut self.selections[selection.index()];
        let Some(info) = state.current.as_ref() else {
            warn!(%selection, "guest sent clipboard data without ownership");
            return;
        };
        let size = data.len();
        match self.broker.set_data(self.peer, info, ty, data) {
            Ok(updated) => {
                debug!(%selection, data_type = %ty, size, "guest clipboard data stored");
                state.current = Some(updated);
            }
            Err(e) => warn!(%selection, error = %e, "guest clipboard data rejected"),
        }
    }

    /// CLIPBOARD_RELEASE: the guest gives up `selection`.
    pub fn on_guest_release(&mut self, selection: Selection) -> Vec<AgentMessage> {
        let state = &mut self.selections[selection.index()];
        let owned = state
            .current
            .as_ref()
            .is_some_and(|info| info.is_owned_by(self.peer));
        if !owned {
            debug!(%selection, "release for a selection the guest does not own; ignored");
            return Vec::new();
        }
        let published = self.broker.publish(ClipboardInfo::new(None, selection));
        debug!(%selection, generation = published.generation(), "guest released selection");
        state.adopt(published);
        Vec::new()
    }
}

fn grab_message(info: &ClipboardInfo, selection: Option<Selection>) -> AgentMessage {
    let types = info
        .available_types()
        .filter_map(WireClipboardType::from_host)
        .map(|ty| ty as u32)
        .collect();
    AgentMessage::ClipboardGrab(ClipboardGrabMessage { selection, types })
}

fn data_message(info: &ClipboardInfo, ty: ClipboardType, selection: Option<Selection>) -> Option<AgentMessage> {
    let data_type = WireClipboardType::from_host(ty)?;
    let data = info.data(ty)?.to_vec();
    Some(AgentMessage::ClipboardData(ClipboardDataMessage {
        selection,
        data_type,
        data,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // ── Recording broker ──────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingBroker {
        generation: Mutex<u64>,
        published: Mutex<Vec<Arc<ClipboardInfo>>>,
        requests: Mutex<Vec<(u64, ClipboardType)>>,
        data: Mutex<Vec<(PeerId, Vec<u8>)>>,
        registered: Mutex<Vec<PeerId>>,
    }

    impl ClipboardBroker for RecordingBroker {
        fn register_peer(&self, peer: PeerId, _: Arc<dyn ClipboardPeer>) -> Result<(), BrokerError> {
            self.registered.lock().unwrap().push(peer);
            Ok(())
        }

        fn unregister_peer(&self, peer: PeerId) {
            self.registered.lock().unwrap().retain(|p| *p != peer);
        }

        fn publish(&self, info: ClipboardInfo) -> Arc<ClipboardInfo> {
            let mut generation = self.generation.lock().unwrap();
            *generation += 1;
            let stamped = Arc::new(info.with_generation(*generation));
            self.published.lock().unwrap().push(Arc::clone(&stamped));
            stamped
        }

        fn current(&self, selection: Selection) -> Option<Arc<ClipboardInfo>> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|i| i.selection() == selection)
                .cloned()
        }

        fn request(&self, info: &ClipboardInfo, data_type: ClipboardType) {
            self.requests.lock().unwrap().push((info.generation(), data_type));
        }

        fn set_data(
            &self,
            peer: PeerId,
            info: &ClipboardInfo,
            data_type: ClipboardType,
            data: Vec<u8>,
        ) -> Result<Arc<ClipboardInfo>, BrokerError> {
            if !info.is_owned_by(peer) {
                return Err(BrokerError::NotOwner { peer, selection: info.selection() });
            }
            self.data.lock().unwrap().push((peer, data.clone()));
            Ok(Arc::new(info.clone().with_data(data_type, data)))
        }
    }

    struct NullPeer;

    impl ClipboardPeer for NullPeer {
        fn deliver(&self, _: BrokerEvent) {}
    }

    fn registered_bridge() -> (ClipboardBridge, Arc<RecordingBroker>) {
        let broker = Arc::new(RecordingBroker::default());
        let mut bridge = ClipboardBridge::new(PeerId::new(), broker.clone());
        bridge.register(Arc::new(NullPeer)).unwrap();
        (bridge, broker)
    }

    fn host_info(selection: Selection, generation: u64) -> Arc<ClipboardInfo> {
        Arc::new(
            ClipboardInfo::new(Some(PeerId::new()), selection)
                .with_available(ClipboardType::Text)
                .with_generation(generation),
        )
    }

    // ── Broker notifications ──────────────────────────────────────────────────

    #[test]
    fn test_foreign_grab_is_forwarded_to_guest() {
        // Arrange
        let (mut bridge, _) = registered_bridge();

        // Act
        let out = bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Primary, 1)), true);

        // Assert
        assert_eq!(
            out,
            vec![AgentMessage::ClipboardGrab(ClipboardGrabMessage {
                selection: Some(Selection::Primary),
                types: vec![WireClipboardType::Utf8Text as u32],
            })]
        );
    }

    #[test]
    fn test_self_owned_update_is_never_echoed() {
        // Arrange
        let (mut bridge, _) = registered_bridge();
        let own = Arc::new(
            ClipboardInfo::new(Some(bridge.peer_id()), Selection::Clipboard)
                .with_data(ClipboardType::Text, b"mine".to_vec())
                .with_generation(3),
        );

        // Act
        let first = bridge.on_broker_event(BrokerEvent::Update(Arc::clone(&own)), true);
        let again = bridge.on_broker_event(BrokerEvent::Update(own), true);

        // Assert
        assert!(first.is_empty());
        assert!(again.is_empty());
    }

    #[test]
    fn test_new_grab_clears_pending_types() {
        // Arrange
        let (mut bridge, broker) = registered_bridge();
        bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Clipboard, 1)), true);
        bridge.on_guest_request(Selection::Clipboard, WireClipboardType::Utf8Text, true);
        assert!(bridge.pending(Selection::Clipboard).contains(ClipboardType::Text));

        // Act
        bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Clipboard, 2)), true);

        // Assert
        assert!(bridge.pending(Selection::Clipboard).is_empty());
        assert_eq!(broker.requests.lock().unwrap().as_slice(), &[(1, ClipboardType::Text)]);
    }

    #[test]
    fn test_stale_update_does_not_roll_back() {
        // Arrange
        let (mut bridge, _) = registered_bridge();
        bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Clipboard, 5)), true);

        // Act
        let out = bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Clipboard, 4)), true);

        // Assert
        assert!(out.is_empty());
        assert_eq!(bridge.current(Selection::Clipboard).map(|i| i.generation()), Some(5));
    }

    #[test]
    fn test_data_arrival_sends_pending_type_once() {
        // Arrange
        let (mut bridge, _) = registered_bridge();
        let grab = host_info(Selection::Clipboard, 1);
        bridge.on_broker_event(BrokerEvent::Update(Arc::clone(&grab)), true);
        bridge.on_guest_request(Selection::Clipboard, WireClipboardType::Utf8Text, true);
        let filled = Arc::new((*grab).clone().with_data(ClipboardType::Text, b"hi".to_vec()));

        // Act
        let first = bridge.on_broker_event(BrokerEvent::Update(Arc::clone(&filled)), true);
        let second = bridge.on_broker_event(BrokerEvent::Update(filled), true);

        // Assert
        assert_eq!(
            first,
            vec![AgentMessage::ClipboardData(ClipboardDataMessage {
                selection: Some(Selection::Clipboard),
                data_type: WireClipboardType::Utf8Text,
                data: b"hi".to_vec(),
            })]
        );
        assert!(second.is_empty());
        assert!(bridge.pending(Selection::Clipboard).is_empty());
    }

    #[test]
    fn test_non_clipboard_selection_is_not_forwarded_without_selection_capability() {
        let (mut bridge, _) = registered_bridge();
        let out = bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Primary, 1)), false);
        assert!(out.is_empty());
    }

    #[test]
    fn test_host_request_for_guest_owned_selection_asks_guest() {
        // Arrange
        let (mut bridge, _) = registered_bridge();
        bridge.on_guest_grab(Selection::Primary, &[WireClipboardType::Utf8Text as u32]);
        let info = Arc::clone(bridge.current(Selection::Primary).unwrap());

        // Act
        let out = bridge.on_broker_event(
            BrokerEvent::Request { info, data_type: ClipboardType::Text },
            true,
        );

        // Assert
        assert_eq!(
            out,
            vec![AgentMessage::ClipboardRequest(ClipboardRequestMessage {
                selection: Some(Selection::Primary),
                data_type: WireClipboardType::Utf8Text,
            })]
        );
    }

    #[test]
    fn test_events_after_unregister_are_ignored() {
        let (mut bridge, _) = registered_bridge();
        bridge.unregister();
        let out = bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Clipboard, 1)), true);
        assert!(out.is_empty());
        assert!(bridge.current(Selection::Clipboard).is_none());
    }

    // ── Guest messages ────────────────────────────────────────────────────────

    #[test]
    fn test_guest_grab_publishes_known_types_only() {
        // Arrange
        let (mut bridge, broker) = registered_bridge();

        // Act
        bridge.on_guest_grab(
            Selection::Clipboard,
            &[WireClipboardType::ImagePng as u32, WireClipboardType::Utf8Text as u32, 77],
        );

        // Assert
        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert!(published[0].is_owned_by(bridge.peer_id()));
        assert_eq!(
            published[0].available_types().collect::<Vec<_>>(),
            vec![ClipboardType::Text]
        );
        assert_eq!(bridge.current(Selection::Clipboard), Some(&published[0]));
    }

    #[test]
    fn test_guest_request_with_cached_data_answers_immediately() {
        // Arrange
        let (mut bridge, broker) = registered_bridge();
        let cached = Arc::new(
            ClipboardInfo::new(Some(PeerId::new()), Selection::Clipboard)
                .with_data(ClipboardType::Text, b"cached".to_vec())
                .with_generation(1),
        );
        bridge.on_broker_event(BrokerEvent::Update(cached), false);

        // Act
        let out = bridge.on_guest_request(Selection::Clipboard, WireClipboardType::Utf8Text, false);

        // Assert
        assert_eq!(
            out,
            vec![AgentMessage::ClipboardData(ClipboardDataMessage {
                selection: None,
                data_type: WireClipboardType::Utf8Text,
                data: b"cached".to_vec(),
            })]
        );
        assert!(broker.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_guest_request_for_own_or_unavailable_data_is_ignored() {
        let (mut bridge, broker) = registered_bridge();
        bridge.on_guest_grab(Selection::Clipboard, &[WireClipboardType::Utf8Text as u32]);

        let own = bridge.on_guest_request(Selection::Clipboard, WireClipboardType::Utf8Text, true);
        let png = bridge.on_guest_request(Selection::Clipboard, WireClipboardType::ImagePng, true);
        let empty = bridge.on_guest_request(Selection::Secondary, WireClipboardType::Utf8Text, true);

        assert!(own.is_empty() && png.is_empty() && empty.is_empty());
        assert!(broker.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_guest_data_is_forwarded_to_broker() {
        // Arrange
        let (mut bridge, broker) = registered_bridge();
        bridge.on_guest_grab(Selection::Clipboard, &[WireClipboardType::Utf8Text as u32]);

        // Act
        bridge.on_guest_data(Selection::Clipboard, WireClipboardType::Utf8Text, b"hi".to_vec());

        // Assert
        assert_eq!(broker.data.lock().unwrap().as_slice(), &[(bridge.peer_id(), b"hi".to_vec())]);
        let current = bridge.current(Selection::Clipboard).unwrap();
        assert_eq!(current.data(ClipboardType::Text), Some(&b"hi"[..]));
    }

    #[test]
    fn test_late_copy_of_own_grab_does_not_replace_stored_data() {
        // Arrange
        let (mut bridge, broker) = registered_bridge();
        bridge.on_guest_grab(Selection::Clipboard, &[WireClipboardType::Utf8Text as u32]);
        let grabbed = broker.current(Selection::Clipboard).unwrap();
        bridge.on_guest_data(Selection::Clipboard, WireClipboardType::Utf8Text, b"hi".to_vec());

        // Act
        let out = bridge.on_broker_event(BrokerEvent::Update(grabbed), true);

        // Assert
        assert!(out.is_empty());
        let current = bridge.current(Selection::Clipboard).unwrap();
        assert_eq!(current.data(ClipboardType::Text), Some(&b"hi"[..]));
    }

    #[test]
    fn test_guest_release_publishes_empty_info_only_when_owned() {
        // Arrange
        let (mut bridge, broker) = registered_bridge();
        bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Clipboard, 1)), true);

        // Act
        bridge.on_guest_release(Selection::Clipboard);
        let before = broker.published.lock().unwrap().len();
        bridge.on_guest_grab(Selection::Clipboard, &[WireClipboardType::Utf8Text as u32]);
        bridge.on_guest_release(Selection::Clipboard);

        // Assert
        assert_eq!(before, 0, "host-owned selection is not released by the guest");
        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].owner(), None);
        assert_eq!(bridge.current(Selection::Clipboard).and_then(|i| i.owner()), None);
    }

    #[test]
    fn test_ownerless_update_is_forwarded_as_release() {
        // Arrange
        let (mut bridge, _) = registered_bridge();
        bridge.on_broker_event(BrokerEvent::Update(host_info(Selection::Primary, 1)), true);
        let released = Arc::new(ClipboardInfo::new(None, Selection::Primary).with_generation(2));

        // Act
        let out = bridge.on_broker_event(BrokerEvent::Update(released), true);

        // Assert
        assert_eq!(
            out,
            vec![AgentMessage::ClipboardRelease(ClipboardReleaseMessage {
                selection: Some(Selection::Primary)
            })]
        );
    }
}
