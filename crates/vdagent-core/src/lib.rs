//! # vdagent-core
//!
//! Shared library for the guest-agent bridge containing the wire protocol
//! codec, the stream reassembler and the clipboard/pointer domain entities.
//!
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! A virtual machine runs a small *agent* process inside the guest.  The
//! agent talks to the host over a byte-oriented channel (a virtual serial
//! port) using a chunked binary protocol.  Through it the host forwards the
//! absolute pointer position and both sides share their clipboards.
//!
//! This crate (`vdagent-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the channel.  Messages are wrapped
//!   in an 8-byte chunk header plus a 20-byte message header, decoded into
//!   typed Rust values, and reassembled from arbitrarily fragmented input.
//!
//! - **`domain`** – Pure data with no I/O: clipboard selections and immutable
//!   ownership snapshots, pointer events and axis scaling.
//!
//! The `vdagent-bridge` crate builds the per-connection state machines on
//! top of these types.

// Rust will look for each module in a subdirectory with the same name
// (e.g., src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `vdagent_core::ClipboardInfo` instead of the full module path.
pub use domain::clipboard::{ClipboardInfo, ClipboardType, ClipboardTypeSet, PeerId, Selection};
pub use domain::pointer::{DisplaySize, PointerButton, PointerEvent};
pub use protocol::codec::{decode_message, encode_message, Frame, ProtocolError, RawMessage};
pub use protocol::messages::{AgentMessage, Capabilities};
pub use protocol::reassembly::StreamReassembler;
