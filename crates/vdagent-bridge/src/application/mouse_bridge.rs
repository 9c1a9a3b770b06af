//! MouseBridge: coalesces host pointer events into MOUSE_STATE messages.
//!
//! The host input subsystem reports every axis change and button transition
//! as a separate event.  The guest only needs the latest absolute state, so
//! the bridge folds events into one [`MouseStateMessage`] and emits it once
//! per sync tick.  Wire traffic is therefore bounded by the tick rate, not by
//! how fast the pointer moves.

use std::sync::Arc;

use tracing::{debug, trace};
use vdagent_core::domain::pointer::{
    scale_axis, Axis, DisplaySize, PointerButton, PointerEvent, ABS_MAX, ABS_MIN,
};
use vdagent_core::protocol::messages::{Capabilities, MouseButtons, MouseStateMessage};

/// Port to the host input subsystem.
///
/// The subsystem only delivers pointer events while the subscription is
/// active.  Implementations live in the infrastructure layer.
#[cfg_attr(test, mockall::automock)]
pub trait InputSource: Send + Sync {
    /// Starts delivering pointer events for this session.
    fn activate(&self);

    /// Stops delivering pointer events.
    fn deactivate(&self);

    /// Resolution of the display the pointer moves on.
    fn display_size(&self) -> DisplaySize;
}

/// Wire bit for a pointer button.  Side and extra buttons have none.
fn button_mask(button: PointerButton) -> Option<u32> {
    match button {
        PointerButton::Left => Some(MouseButtons::LEFT),
        PointerButton::Middle => Some(MouseButtons::MIDDLE),
        PointerButton::Right => Some(MouseButtons::RIGHT),
        PointerButton::WheelUp => Some(MouseButtons::WHEEL_UP),
        PointerButton::WheelDown => Some(MouseButtons::WHEEL_DOWN),
        PointerButton::Side | PointerButton::Extra => None,
    }
}

/// The Mouse Bridge use case.
pub struct MouseBridge {
    source: Arc<dyn InputSource>,
    state: MouseStateMessage,
    active: bool,
}

impl MouseBridge {
    /// Creates an inactive bridge over `source`.
    pub fn new(source: Arc<dyn InputSource>) -> Self {
        Self {
            source,
            state: MouseStateMessage::default(),
            active: false,
        }
    }

    /// Activates the input subscription.  Repeated calls are no-ops.
    pub fn activate(&mut self) {
        if !self.active {
            self.source.activate();
            self.active = true;
            debug!("pointer forwarding activated");
        }
    }

    /// Deactivates the input subscription.  Repeated calls are no-ops.
    pub fn deactivate(&mut self) {
        if self.active {
            self.source.deactivate();
            self.active = false;
            debug!("pointer forwarding deactivated");
        }
    }

    /// Returns `true` while the subscription is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Folds one input event into the current state.
    ///
    /// Absolute values are rescaled from the logical axis range to the
    /// display's pixel extent on that axis.
    pub fn on_input_event(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Absolute { axis, value } => {
                let extent = self.source.display_size().extent(axis);
                let scaled = scale_axis(value, ABS_MIN, ABS_MAX, 0, extent as i32).max(0) as u32;
                match axis {
                    Axis::X => self.state.x = scaled,
                    Axis::Y => self.state.y = scaled,
                }
                trace!(?axis, value, scaled, "pointer axis");
            }
            PointerEvent::Button { button, down } => match button_mask(button) {
                Some(mask) => {
                    self.state.buttons.set(mask, down);
                    trace!(?button, down, buttons = self.state.buttons.0, "pointer button");
                }
                None => trace!(?button, "pointer button has no wire bit; ignored"),
            },
        }
    }

    /// Returns the message to send on a sync tick.
    ///
    /// `None` unless the guest announced MOUSE_STATE.
    pub fn on_sync_tick(&self, remote_caps: Capabilities) -> Option<MouseStateMessage> {
        remote_caps
            .contains(Capabilities::MOUSE_STATE)
            .then_some(self.state)
    }

    /// The state accumulated so far.
    pub fn state(&self) -> MouseStateMessage {
        self.state
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
