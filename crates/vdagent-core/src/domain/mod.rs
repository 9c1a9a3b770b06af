//! Domain entities for the agent bridge.
//!
//! This module contains pure data types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code has no imports from OS APIs,
//! sockets, runtimes, or UI toolkits, so it compiles and tests anywhere.
//!
//! Here the domain describes the two host services the bridge talks to: the
//! shared clipboard (selections, owners, lazily delivered data) and the
//! pointer (absolute axes, buttons, display size).

/// Clipboard selections, peers and immutable ownership snapshots.
pub mod clipboard;

/// Pointer events and axis scaling.
pub mod pointer;
