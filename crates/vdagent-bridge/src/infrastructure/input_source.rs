//! Input source with a fixed display resolution.
//!
//! There is no physical input device behind the bridge binary; pointer
//! events arrive on the server's pointer channel (fed by the host feed).
//! Each session owns one of these adapters, and the session's pointer task
//! forwards channel events only while that session's adapter is active.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use vdagent_core::domain::pointer::DisplaySize;

use crate::application::mouse_bridge::InputSource;

/// An [`InputSource`] for a display of a fixed size.
#[derive(Debug)]
pub struct StaticInputSource {
    size: DisplaySize,
    active: AtomicBool,
}

impl StaticInputSource {
    pub fn new(size: DisplaySize) -> Self {
        Self {
            size,
            active: AtomicBool::new(false),
        }
    }

    /// Returns `true` while the owning session has forwarding switched on.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl InputSource for StaticInputSource {
    fn activate(&self) {
        self.active.store(true, Ordering::Release);
        debug!(width = self.size.width, height = self.size.height, "input source activated");
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        debug!("input source deactivated");
    }

    fn display_size(&self) -> DisplaySize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_toggles_flag() {
        let source = StaticInputSource::new(DisplaySize::new(800, 600));

        source.activate();
        assert!(source.is_active());
        source.deactivate();

        assert!(!source.is_active());
        assert_eq!(source.display_size(), DisplaySize::new(800, 600));
    }
}
