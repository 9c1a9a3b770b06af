//! The host-side clipboard peer.
//!
//! `HostClipboard` stands in for the desktop toolkit's clipboard.  It sits on
//! the same broker as the guest sessions and behaves like a well-mannered
//! desktop clipboard:
//!
//! - [`HostClipboard::set_text`] takes ownership of a selection with local
//!   text, supplied up front.
//! - When another peer grabs a selection offering text, it requests the text
//!   and remembers it once delivered.
//! - When another peer requests text from a selection it owns, it answers
//!   with its local text.
//!
//! Broker callbacks only queue events; [`HostClipboard::pump`] (or the
//! [`HostClipboard::run`] task) processes them outside the broker lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, trace, warn};
use vdagent_core::domain::clipboard::{ClipboardInfo, ClipboardType, PeerId, Selection};

use crate::application::clipboard_bridge::{BrokerError, BrokerEvent, ClipboardBroker, ClipboardPeer};

#[derive(Default)]
struct HostState {
    /// Last known text per selection, local or fetched.
    texts: [Option<String>; Selection::COUNT],
    /// Generation of the snapshot each text belongs to.
    generations: [u64; Selection::COUNT],
}

/// In-process clipboard peer for the host desktop.
pub struct HostClipboard {
    id: PeerId,
    broker: Arc<dyn ClipboardBroker>,
    queue: Mutex<VecDeque<BrokerEvent>>,
    wakeup: Notify,
    state: Mutex<HostState>,
}

impl HostClipboard {
    /// Creates an unregistered host clipboard on `broker`.
    pub fn new(broker: Arc<dyn ClipboardBroker>) -> Arc<Self> {
        Arc::new(Self {
            id: PeerId::new(),
            broker,
            queue: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            state: Mutex::new(HostState::default()),
        })
    }

    /// This peer's broker identity.
    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    /// Registers with the broker.
    ///
    /// # Errors
    ///
    /// Propagates the broker's registration error.
    pub fn register(self: &Arc<Self>) -> Result<(), BrokerError> {
        let sink: Arc<dyn ClipboardPeer> = self.clone();
        self.broker.register_peer(self.id, sink)
    }

    /// Leaves the broker, releasing every selection this peer owns.
    pub fn unregister(&self) {
        self.broker.unregister_peer(self.id);
    }

    /// Takes ownership of `selection` with `text`.
    pub fn set_text(&self, selection: Selection, text: impl Into<String>) -> Arc<ClipboardInfo> {
        let text = text.into();
        let info = ClipboardInfo::new(Some(self.id), selection)
            .with_data(ClipboardType::Text, text.clone().into_bytes());
        {
            let mut state = self.lock_state();
            state.texts[selection.index()] = Some(text);
        }
        let published = self.broker.publish(info);
        self.lock_state().generations[selection.index()] = published.generation();
        published
    }

    /// The last text seen on `selection`, from any owner.
    pub fn text(&self, selection: Selection) -> Option<String> {
        self.lock_state().texts[selection.index()].clone()
    }

    /// Processes every queued broker event and returns how many were handled.
    pub fn pump(&self) -> usize {
        let mut handled = 0;
        // The queue lock is released before handling: handlers call the
        // broker, which may deliver straight back into the queue.
        while let Some(event) = self.pop() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Pumps events as they arrive.  Runs until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.wakeup.notified().await;
            self.pump();
        }
    }

    fn pop(&self) -> Option<BrokerEvent> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn lock_state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, event: BrokerEvent) {
        match event {
            BrokerEvent::Update(info) => self.on_update(&info),
            BrokerEvent::Request { info, data_type } => self.on_request(&info, data_type),
        }
    }

    fn on_update(&self, info: &Arc<ClipboardInfo>) {
        let selection = info.selection();
        if info.is_owned_by(self.id) {
            return;
        }

        if let Some(bytes) = info.data(ClipboardType::Text) {
            let text = String::from_utf8_lossy(bytes).into_owned();
            debug!(%selection, size = bytes.len(), "host received clipboard text");
            let mut state = self.lock_state();
            state.texts[selection.index()] = Some(text);
            state.generations[selection.index()] = info.generation();
            return;
        }

        {
            let mut state = self.lock_state();
            if state.generations[selection.index()] != info.generation() {
                state.texts[selection.index()] = None;
                state.generations[selection.index()] = info.generation();
            }
        }

        if info.owner().is_some() && info.is_available(ClipboardType::Text) {
            trace!(%selection, generation = info.generation(), "host fetching new clipboard text");
            self.broker.request(info, ClipboardType::Text);
        }
    }

    fn on_request(&self, info: &ClipboardInfo, data_type: ClipboardType) {
        let selection = info.selection();
        let Some(text) = self.text(selection) else {
            debug!(%selection, "host has no text to answer with");
            return;
        };
        match self
            .broker
            .set_data(self.id, info, data_type, text.into_bytes())
        {
            Ok(_) => debug!(%selection, "host answered clipboard request"),
            Err(e) => warn!(%selection, error = %e, "host clipboard answer rejected"),
        }
    }
}

impl ClipboardPeer for HostClipboard {
    fn deliver(&self, event: BrokerEvent) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
        self.wakeup.notify_one();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
