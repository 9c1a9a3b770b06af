//! Transport adapters implementing the `Transport` port.
//!
//! - **`channel`** – The production transport: a byte-budgeted queue drained
//!   into the guest socket by a writer task.
//! - **`mock`** – `RecordingTransport`, which records and decodes output.

pub mod channel;
pub mod mock;

pub use channel::{channel_transport, ChannelTransport, ChannelWriter};
pub use mock::RecordingTransport;
