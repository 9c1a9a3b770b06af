//! Capability negotiation with the guest agent.
//!
//! The guest opens the conversation with ANNOUNCE_CAPABILITIES.  The
//! negotiator stores the guest's bitmask and decides, from the guest's bits
//! and the host's own feature configuration, which features switch on.  It
//! does not perform the side effects itself; it returns them as
//! [`NegotiationEffect`]s so the session can apply them in order.

use tracing::{debug, info};
use vdagent_core::protocol::messages::{AnnounceCapabilitiesMessage, Capabilities};

/// Features the host side is configured to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureConfig {
    /// Forward the absolute pointer to the guest.
    pub mouse: bool,
    /// Share clipboards with the guest.
    pub clipboard: bool,
}

impl FeatureConfig {
    /// The capability bitmask the host announces to the guest.
    ///
    /// Mouse forwarding sets MOUSE_STATE.  Clipboard sharing sets both
    /// CLIPBOARD_BY_DEMAND and CLIPBOARD_SELECTION.
    pub fn host_capabilities(&self) -> Capabilities {
        let mut caps = 0;
        if self.mouse {
            caps |= Capabilities::MOUSE_STATE;
        }
        if self.clipboard {
            caps |= Capabilities::CLIPBOARD_BY_DEMAND | Capabilities::CLIPBOARD_SELECTION;
        }
        Capabilities(caps)
    }
}

/// A side effect requested by [`CapabilityNegotiator::on_announce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationEffect {
    /// Reply to the guest with the host's own capabilities.
    SendCapabilities(AnnounceCapabilitiesMessage),
    /// Start the pointer sync subscription.
    ActivateMouse,
    /// Register the session as a clipboard broker peer.
    RegisterClipboard,
}

/// Tracks the guest's capability bitmask for one session.
#[derive(Debug)]
pub struct CapabilityNegotiator {
    features: FeatureConfig,
    remote: Capabilities,
}

impl CapabilityNegotiator {
    /// Creates a negotiator with no guest capabilities yet.
    pub fn new(features: FeatureConfig) -> Self {
        Self {
            features,
            remote: Capabilities::empty(),
        }
    }

    /// Handles one ANNOUNCE_CAPABILITIES from the guest.
    ///
    /// Every announcement replaces the stored bitmask and re-evaluates the
    /// gates.  `clipboard_registered` suppresses a second registration.
    pub fn on_announce(
        &mut self,
        msg: &AnnounceCapabilitiesMessage,
        clipboard_registered: bool,
    ) -> Vec<NegotiationEffect> {
        self.remote = msg.capabilities();
        info!(caps = %self.remote, request = msg.request, "guest announced capabilities");

        let mut effects = Vec::new();

        if msg.request {
            let reply = AnnounceCapabilitiesMessage::new(false, self.features.host_capabilities());
            debug!(caps = %reply.capabilities(), "replying with host capabilities");
            effects.push(NegotiationEffect::SendCapabilities(reply));
        }

        if self.mouse_enabled() {
            effects.push(NegotiationEffect::ActivateMouse);
        }

        if self.clipboard_enabled() && !clipboard_registered {
            effects.push(NegotiationEffect::RegisterClipboard);
        }

        effects
    }

    /// The guest's capability bitmask (empty before the first announcement).
    pub fn remote_caps(&self) -> Capabilities {
        self.remote
    }

    /// The host feature configuration.
    pub fn features(&self) -> FeatureConfig {
        self.features
    }

    /// Mouse forwarding is configured and the guest accepts MOUSE_STATE.
    pub fn mouse_enabled(&self) -> bool {
        self.features.mouse && self.remote.contains(Capabilities::MOUSE_STATE)
    }

    /// Clipboard sharing is configured and the guest supports on-demand,
    /// per-selection clipboards.
    pub fn clipboard_enabled(&self) -> bool {
        self.features.clipboard
            && self
                .remote
                .contains(Capabilities::CLIPBOARD_BY_DEMAND | Capabilities::CLIPBOARD_SELECTION)
    }

    /// Clipboard payloads carry a selection header.
    pub fn selection_enabled(&self) -> bool {
        self.remote.contains(Capabilities::CLIPBOARD_SELECTION)
    }

    /// Forgets the guest's capabilities (on disconnect).
    pub fn reset(&mut self) {
        self.remote = Capabilities::empty();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
