//! Host control feed: line-delimited JSON commands that drive the host side
//! of the bridge.
//!
//! The bridge binary has no windowing system of its own.  Whatever stands in
//! for the host desktop (a script, a test harness, a terminal) writes one
//! JSON object per line to the bridge's standard input:
//!
//! ```text
//! {"type":"move","x":16384,"y":16384}
//! {"type":"button","button":"left","down":true}
//! {"type":"copy","selection":"clipboard","text":"hello guest"}
//! {"type":"paste","selection":"primary"}
//! ```
//!
//! Pointer commands are published on the server's pointer channel, so every
//! session with pointer forwarding switched on sees them.  `copy` makes the
//! host clipboard peer the owner of a selection; `paste` answers with one
//! JSON line holding the host peer's latest copy of a selection, which is
//! how text copied inside the guest reaches the host.
//!
//! # Serde representation
//!
//! `#[serde(tag = "type")]` selects the variant from the `"type"` field and
//! reads the remaining fields from the same object.  `selection` may be
//! omitted and defaults to `"clipboard"`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use vdagent_core::domain::clipboard::Selection;
use vdagent_core::domain::pointer::{Axis, PointerButton, PointerEvent};

use crate::infrastructure::clipboard::host::HostClipboard;

/// A command read from the feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// Absolute pointer position in logical units (`0..=0x7fff` per axis).
    Move { x: i32, y: i32 },
    /// Button press or release.
    Button { button: PointerButton, down: bool },
    /// The host copies `text` into `selection`.
    Copy {
        #[serde(default = "default_selection")]
        selection: Selection,
        text: String,
    },
    /// Ask for the host's current text for `selection`.
    Paste {
        #[serde(default = "default_selection")]
        selection: Selection,
    },
}

/// A line written back to the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostReply {
    /// Answer to [`HostCommand::Paste`].  `text` is `null` when the host
    /// holds nothing for the selection.
    Text { selection: Selection, text: Option<String> },
}

fn default_selection() -> Selection {
    Selection::Clipboard
}

/// Applies one command.  Returns the reply to write back, if any.
pub fn apply_command(
    command: HostCommand,
    pointer: &broadcast::Sender<PointerEvent>,
    host: &HostClipboard,
) -> Option<HostReply> {
    match command {
        HostCommand::Move { x, y } => {
            publish_pointer(pointer, PointerEvent::Absolute { axis: Axis::X, value: x });
            publish_pointer(pointer, PointerEvent::Absolute { axis: Axis::Y, value: y });
            None
        }
        HostCommand::Button { button, down } => {
            publish_pointer(pointer, PointerEvent::Button { button, down });
            None
        }
        HostCommand::Copy { selection, text } => {
            let info = host.set_text(selection, text);
            debug!(%selection, generation = info.generation(), "host copied text");
            None
        }
        HostCommand::Paste { selection } => Some(HostReply::Text {
            selection,
            text: host.text(selection),
        }),
    }
}

fn publish_pointer(pointer: &broadcast::Sender<PointerEvent>, event: PointerEvent) {
    // No receivers just means no guest is connected yet.
    if pointer.send(event).is_err() {
        trace!(?event, "no session listening for pointer events");
    }
}

/// Reads commands from `input` until it closes, writing replies to
/// `output`.  Lines that do not parse are logged and skipped.
///
/// # Errors
///
/// Returns the first I/O error from `input` or `output`.
pub async fn run_host_feed<R, W>(
    input: R,
    mut output: W,
    pointer: broadcast::Sender<PointerEvent>,
    host: Arc<HostClipboard>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match serde_json::from_str::<HostCommand>(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "unrecognised host command skipped");
                continue;
            }
        };
        if let Some(reply) = apply_command(command, &pointer, &host) {
            let mut text = serde_json::to_string(&reply)?;
            text.push('\n');
            output.write_all(text.as_bytes()).await?;
            output.flush().await?;
        }
    }
    debug!("host feed closed");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
