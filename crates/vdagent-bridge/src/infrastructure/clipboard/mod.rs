//! Clipboard infrastructure: the shared broker and the peers that sit on it
//! next to the guest sessions.
//!
//! - **`broker`** – `InMemoryClipboardBroker`, the process-wide
//!   implementation of the `ClipboardBroker` port.
//! - **`host`** – `HostClipboard`, the host desktop's clipboard peer.
//! - **`mock`** – `QueuedPeer`, a peer that only records deliveries, for tests.

pub mod broker;
pub mod host;
pub mod mock;
