//! Application layer use cases for the guest-agent bridge.
//!
//! # What use cases does the bridge have?
//!
//! - **`negotiate_caps`** – Stores the guest's ANNOUNCE_CAPABILITIES bitmask,
//!   replies with the host's own bits and decides which features switch on.
//!
//! - **`mouse_bridge`** – Folds host pointer events into one absolute
//!   MOUSE_STATE that is sent on every sync tick.  The host input subsystem is
//!   reached through the `InputSource` port.
//!
//! - **`clipboard_bridge`** – The per-selection clipboard state machine
//!   between the guest and the shared `ClipboardBroker`.
//!
//! - **`outbound`** – Writes whole frames through a `Transport` that applies
//!   backpressure.
//!
//! - **`session`** – The per-connection actor that owns all of the above and
//!   processes one `SessionEvent` at a time.
//!
//! The ports (`InputSource`, `ClipboardBroker`, `ClipboardPeer`, `Transport`)
//! are traits; their implementations live in `infrastructure` and are
//! injected at construction time.

pub mod clipboard_bridge;
pub mod mouse_bridge;
pub mod negotiate_caps;
pub mod outbound;
pub mod session;
