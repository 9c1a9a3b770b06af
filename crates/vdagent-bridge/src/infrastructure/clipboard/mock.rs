//! A clipboard peer that only queues what the broker delivers.
//!
//! Tests register a `QueuedPeer` next to the real peers and inspect the
//! delivered events with [`QueuedPeer::drain`].

use std::sync::{Mutex, PoisonError};

use crate::application::clipboard_bridge::{BrokerEvent, ClipboardPeer};

/// Records every delivered [`BrokerEvent`] in order.
#[derive(Default)]
pub struct QueuedPeer {
    events: Mutex<Vec<BrokerEvent>>,
}

impl QueuedPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything delivered so far.
    pub fn drain(&self) -> Vec<BrokerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ClipboardPeer for QueuedPeer {
    fn deliver(&self, event: BrokerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
