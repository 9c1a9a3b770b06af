//! Infrastructure layer for the bridge.
//!
//! Contains the adapters behind the application-layer ports plus the
//! process plumbing.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `vdagent_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`clipboard`** – The in-memory clipboard broker and the host desktop's
//!   clipboard peer.
//!
//! - **`transport`** – The byte-budgeted channel transport towards the guest
//!   socket, and a recording transport for tests.
//!
//! - **`input_source`** – A fixed-resolution `InputSource`.
//!
//! - **`host_feed`** – Line-delimited JSON commands on stdin that move the
//!   pointer and drive the host clipboard.
//!
//! - **`config`** – TOML configuration with per-field defaults.
//!
//! - **`server`** – TCP accept loop that runs one session actor per guest.

pub mod clipboard;
pub mod config;
pub mod host_feed;
pub mod input_source;
pub mod server;
pub mod transport;

pub use server::{run_server, serve, ServerContext};
