//! vdagent-bridge library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does vdagent-bridge do? (for beginners)
//!
//! A virtual machine runs a small *agent* inside the guest operating system.
//! The bridge is the host-side end of the agent's channel.  For every guest
//! connection it:
//!
//! 1. Waits for the guest's ANNOUNCE_CAPABILITIES and replies with the
//!    features the host offers.
//! 2. If the guest accepts absolute pointer updates, sends the host pointer
//!    position and buttons as MOUSE_STATE on every sync tick.
//! 3. If the guest supports on-demand, per-selection clipboards, joins the
//!    shared clipboard broker so that copy on one side can be pasted on the
//!    other.
//!
//! Data is fetched lazily: a grab only announces which types an owner can
//! supply, and the bytes travel only when another side asks for them.

/// Application layer: use cases and the ports they depend on.
pub mod application;

/// Infrastructure layer: broker, transports, config and the TCP server.
pub mod infrastructure;
