//! In-memory clipboard broker shared by every peer in the process.
//!
//! # How the broker works (for beginners)
//!
//! The broker holds one current [`ClipboardInfo`] snapshot per selection and
//! a list of registered peers.  Every state change, whether a new owner or
//! data arriving for the current owner, becomes a new snapshot that is
//! fanned out to *every* registered peer, the publisher included.
//!
//! All of this happens under one mutex.  Two peers publishing at the same
//! time are therefore serialised: each peer observes the same ownership
//! order for a selection and never sees two owners at once.  Because the
//! fan-out also runs under the lock, [`ClipboardPeer::deliver`]
//! implementations must only queue the event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace, warn};
use vdagent_core::domain::clipboard::{ClipboardInfo, ClipboardType, PeerId, Selection};

use crate::application::clipboard_bridge::{BrokerError, BrokerEvent, ClipboardBroker, ClipboardPeer};

struct BrokerState {
    next_generation: u64,
    current: [Option<Arc<ClipboardInfo>>; Selection::COUNT],
    peers: Vec<(PeerId, Arc<dyn ClipboardPeer>)>,
}

impl BrokerState {
    fn stamp(&mut self, info: ClipboardInfo) -> Arc<ClipboardInfo> {
        let generation = self.next_generation;
        self.next_generation += 1;
        Arc::new(info.with_generation(generation))
    }

    fn broadcast(&self, info: &Arc<ClipboardInfo>) {
        for (_, peer) in &self.peers {
            peer.deliver(BrokerEvent::Update(Arc::clone(info)));
        }
    }

    fn peer(&self, id: PeerId) -> Option<&Arc<dyn ClipboardPeer>> {
        self.peers.iter().find(|(p, _)| *p == id).map(|(_, sink)| sink)
    }
}

/// The process-wide clipboard broker.
pub struct InMemoryClipboardBroker {
    state: Mutex<BrokerState>,
}

impl Default for InMemoryClipboardBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryClipboardBroker {
    /// Creates a broker with empty selections and no peers.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState {
                next_generation: 1,
                current: Default::default(),
                peers: Vec::new(),
            }),
        }
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClipboardBroker for InMemoryClipboardBroker {
    fn register_peer(&self, peer: PeerId, sink: Arc<dyn ClipboardPeer>) -> Result<(), BrokerError> {
        let mut state = self.lock();
        if state.peer(peer).is_some() {
            return Err(BrokerError::DuplicatePeer(peer));
        }
        state.peers.push((peer, sink));
        info!(%peer, peers = state.peers.len(), "clipboard peer registered");
        Ok(())
    }

    fn unregister_peer(&self, peer: PeerId) {
        let mut state = self.lock();
        let before = state.peers.len();
        state.peers.retain(|(p, _)| *p != peer);
        if state.peers.len() == before {
            return;
        }

        for selection in Selection::ALL {
            let owned = state.current[selection.index()]
                .as_ref()
                .is_some_and(|info| info.is_owned_by(peer));
            if owned {
                let empty = state.stamp(ClipboardInfo::new(None, selection));
                debug!(%peer, %selection, generation = empty.generation(), "owner left; selection reset");
                state.current[selection.index()] = Some(Arc::clone(&empty));
                state.broadcast(&empty);
            }
        }
        info!(%peer, peers = state.peers.len(), "clipboard peer unregistered");
    }

    fn publish(&self, info: ClipboardInfo) -> Arc<ClipboardInfo> {
        let mut state = self.lock();
        let stamped = state.stamp(info);
        let selection = stamped.selection();
        debug!(
            %selection,
            generation = stamped.generation(),
            owner = ?stamped.owner(),
            "clipboard ownership published"
        );
        state.current[selection.index()] = Some(Arc::clone(&stamped));
        state.broadcast(&stamped);
        stamped
    }

    fn current(&self, selection: Selection) -> Option<Arc<ClipboardInfo>> {
        self.lock().current[selection.index()].clone()
    }

    fn request(&self, info: &ClipboardInfo, data_type: ClipboardType) {
        let state = self.lock();
        let selection = info.selection();
        let Some(current) = state.current[selection.index()].as_ref() else {
            return;
        };
        if current.generation() != info.generation() {
            trace!(%selection, "request for a superseded snapshot dropped");
            return;
        }
        if current.data(data_type).is_some() || !current.is_available(data_type) {
            trace!(%selection, %data_type, "nothing to fetch");
            return;
        }
        let Some(owner) = current.owner() else {
            return;
        };
        match state.peer(owner) {
            Some(sink) => {
                debug!(%selection, %data_type, %owner, "routing clipboard request to owner");
                sink.deliver(BrokerEvent::Request {
                    info: Arc::clone(current),
                    data_type,
                });
            }
            None => warn!(%selection, %owner, "owner is not registered; request dropped"),
        }
    }

    fn set_data(
        &self,
        peer: PeerId,
        info: &ClipboardInfo,
        data_type: ClipboardType,
        data: Vec<u8>,
    ) -> Result<Arc<ClipboardInfo>, BrokerError> {
        let mut state = self.lock();
        let selection = info.selection();
        let current = state.current[selection.index()].clone();
        let Some(current) = current else {
            return Err(BrokerError::NotOwner { peer, selection });
        };
        if current.generation() != info.generation() {
            return Err(BrokerError::StaleGeneration {
                selection,
                offered: info.generation(),
                current: current.generation(),
            });
        }
        if !current.is_owned_by(peer) {
            return Err(BrokerError::NotOwner { peer, selection });
        }

        let size = data.len();
        let updated = Arc::new((*current).clone().with_data(data_type, data));
        debug!(%selection, %data_type, size, generation = updated.generation(), "clipboard data delivered");
        state.current[selection.index()] = Some(Arc::clone(&updated));
        state.broadcast(&updated);
        Ok(updated)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
