//! All guest-agent protocol message types.
//!
//! Every message travels inside a *chunk* (port + size) and starts with a
//! fixed message header (protocol, type, opaque, size).  The structs in this
//! module describe the type-specific payload that follows the header.

use std::fmt;

use crate::domain::clipboard::{ClipboardType, Selection};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Protocol identifier stamped into every message header.
pub const AGENT_PROTOCOL: u32 = 1;

/// Size of the chunk header (`port:u32`, `size:u32`).
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Size of the message header (`protocol:u32`, `type:u32`, `opaque:u64`, `size:u32`).
pub const MESSAGE_HEADER_SIZE: usize = 20;

/// Largest payload a single message may carry.
pub const MAX_DATA_SIZE: usize = 2048;

/// Largest chunk (headers included) the receive buffer must hold.
pub const MAX_MESSAGE_SIZE: usize = CHUNK_HEADER_SIZE + MESSAGE_HEADER_SIZE + MAX_DATA_SIZE;

/// Port used for every host-originated chunk.
pub const CLIENT_PORT: u32 = 1;

/// Size of the optional selection header (`selection:u8` + 3 reserved bytes).
pub const SELECTION_HEADER_SIZE: usize = 4;

// ── Message type codes ────────────────────────────────────────────────────────

/// Every message type code defined by the agent protocol family.
///
/// Only a subset is handled by the bridge (see [`AgentMessage`]); the rest
/// decode to [`crate::protocol::ProtocolError::UnsupportedMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    MouseState = 1,
    MonitorsConfig = 2,
    Reply = 3,
    Clipboard = 4,
    DisplayConfig = 5,
    AnnounceCapabilities = 6,
    ClipboardGrab = 7,
    ClipboardRequest = 8,
    ClipboardRelease = 9,
    FileXferStart = 10,
    FileXferStatus = 11,
    FileXferData = 12,
    ClientDisconnected = 13,
    MaxClipboard = 14,
    AudioVolumeSync = 15,
    GraphicsDeviceInfo = 16,
}

impl MessageType {
    /// Diagnostic name of the message type.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::MouseState => "mouse-state",
            MessageType::MonitorsConfig => "monitors-config",
            MessageType::Reply => "reply",
            MessageType::Clipboard => "clipboard",
            MessageType::DisplayConfig => "display-config",
            MessageType::AnnounceCapabilities => "announce-capabilities",
            MessageType::ClipboardGrab => "clipboard-grab",
            MessageType::ClipboardRequest => "clipboard-request",
            MessageType::ClipboardRelease => "clipboard-release",
            MessageType::FileXferStart => "file-xfer-start",
            MessageType::FileXferStatus => "file-xfer-status",
            MessageType::FileXferData => "file-xfer-data",
            MessageType::ClientDisconnected => "client-disconnected",
            MessageType::MaxClipboard => "max-clipboard",
            MessageType::AudioVolumeSync => "audio-volume-sync",
            MessageType::GraphicsDeviceInfo => "graphics-device-info",
        }
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            1 => Ok(MessageType::MouseState),
            2 => Ok(MessageType::MonitorsConfig),
            3 => Ok(MessageType::Reply),
            4 => Ok(MessageType::Clipboard),
            5 => Ok(MessageType::DisplayConfig),
            6 => Ok(MessageType::AnnounceCapabilities),
            7 => Ok(MessageType::ClipboardGrab),
            8 => Ok(MessageType::ClipboardRequest),
            9 => Ok(MessageType::ClipboardRelease),
            10 => Ok(MessageType::FileXferStart),
            11 => Ok(MessageType::FileXferStatus),
            12 => Ok(MessageType::FileXferData),
            13 => Ok(MessageType::ClientDisconnected),
            14 => Ok(MessageType::MaxClipboard),
            15 => Ok(MessageType::AudioVolumeSync),
            16 => Ok(MessageType::GraphicsDeviceInfo),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Capability bitmask exchanged in ANNOUNCE_CAPABILITIES (word 0).
///
/// Each constant is the mask of one bit; combine them with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(pub u32);

impl Capabilities {
    pub const MOUSE_STATE: u32 = 1 << 0;
    pub const MONITORS_CONFIG: u32 = 1 << 1;
    pub const REPLY: u32 = 1 << 2;
    pub const CLIPBOARD: u32 = 1 << 3;
    pub const DISPLAY_CONFIG: u32 = 1 << 4;
    pub const CLIPBOARD_BY_DEMAND: u32 = 1 << 5;
    pub const CLIPBOARD_SELECTION: u32 = 1 << 6;
    pub const SPARSE_MONITORS_CONFIG: u32 = 1 << 7;
    pub const GUEST_LINEEND_LF: u32 = 1 << 8;
    pub const GUEST_LINEEND_CRLF: u32 = 1 << 9;
    pub const MAX_CLIPBOARD: u32 = 1 << 10;
    pub const AUDIO_VOLUME_SYNC: u32 = 1 << 11;
    pub const MONITORS_CONFIG_POSITION: u32 = 1 << 12;
    pub const FILE_XFER_DISABLED: u32 = 1 << 13;
    pub const FILE_XFER_DETAILED_ERRORS: u32 = 1 << 14;

    const NAMES: [(u32, &'static str); 15] = [
        (Self::MOUSE_STATE, "mouse-state"),
        (Self::MONITORS_CONFIG, "monitors-config"),
        (Self::REPLY, "reply"),
        (Self::CLIPBOARD, "clipboard"),
        (Self::DISPLAY_CONFIG, "display-config"),
        (Self::CLIPBOARD_BY_DEMAND, "clipboard-by-demand"),
        (Self::CLIPBOARD_SELECTION, "clipboard-selection"),
        (Self::SPARSE_MONITORS_CONFIG, "sparse-monitors-config"),
        (Self::GUEST_LINEEND_LF, "guest-lineend-lf"),
        (Self::GUEST_LINEEND_CRLF, "guest-lineend-crlf"),
        (Self::MAX_CLIPBOARD, "max-clipboard"),
        (Self::AUDIO_VOLUME_SYNC, "audio-volume-sync"),
        (Self::MONITORS_CONFIG_POSITION, "monitors-config-position"),
        (Self::FILE_XFER_DISABLED, "file-xfer-disabled"),
        (Self::FILE_XFER_DETAILED_ERRORS, "file-xfer-detailed-errors"),
    ];

    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns `true` if every bit of `mask` is set.
    pub fn contains(&self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    /// Names of the known capabilities that are set, for diagnostics.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        Self::NAMES
            .iter()
            .filter(|(mask, _)| self.0 & mask != 0)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x} [", self.0)?;
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str("]")
    }
}

// ── Mouse ─────────────────────────────────────────────────────────────────────

/// Button bitmask carried in [`MouseStateMessage::buttons`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseButtons(pub u32);

impl MouseButtons {
    pub const LEFT: u32 = 1 << 1;
    pub const MIDDLE: u32 = 1 << 2;
    pub const RIGHT: u32 = 1 << 3;
    pub const WHEEL_UP: u32 = 1 << 4;
    pub const WHEEL_DOWN: u32 = 1 << 5;

    /// Sets (`down = true`) or clears the bits of `mask`.
    pub fn set(&mut self, mask: u32, down: bool) {
        if down {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// Returns `true` if every bit of `mask` is set.
    pub fn contains(&self, mask: u32) -> bool {
        self.0 & mask == mask
    }
}

/// MOUSE_STATE (1): absolute pointer position and button state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseStateMessage {
    /// X position in display pixels.
    pub x: u32,
    /// Y position in display pixels.
    pub y: u32,
    /// Pressed buttons.
    pub buttons: MouseButtons,
    /// Display the coordinates refer to.
    pub display_id: u8,
}

// ── Capabilities message ──────────────────────────────────────────────────────

/// ANNOUNCE_CAPABILITIES (6): feature negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceCapabilitiesMessage {
    /// The sender wants the receiver to announce its own capabilities back.
    pub request: bool,
    /// Capability words; only word 0 is interpreted.
    pub caps: Vec<u32>,
}

impl AnnounceCapabilitiesMessage {
    /// Builds a single-word announcement.
    pub fn new(request: bool, caps: Capabilities) -> Self {
        Self {
            request,
            caps: vec![caps.0],
        }
    }

    /// The interpreted capability word (0 if none was sent).
    pub fn capabilities(&self) -> Capabilities {
        Capabilities(self.caps.first().copied().unwrap_or(0))
    }
}

// ── Clipboard ─────────────────────────────────────────────────────────────────

/// Clipboard data type codes used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WireClipboardType {
    None = 0,
    Utf8Text = 1,
    ImagePng = 2,
    ImageBmp = 3,
    ImageTiff = 4,
    ImageJpg = 5,
}

impl WireClipboardType {
    /// Maps a wire type to the host clipboard type, if the host supports it.
    pub fn host_type(self) -> Option<ClipboardType> {
        match self {
            WireClipboardType::Utf8Text => Some(ClipboardType::Text),
            WireClipboardType::None
            | WireClipboardType::ImagePng
            | WireClipboardType::ImageBmp
            | WireClipboardType::ImageTiff
            | WireClipboardType::ImageJpg => None,
        }
    }

    /// Maps a host clipboard type to its wire code, if it has one.
    pub fn from_host(ty: ClipboardType) -> Option<Self> {
        match ty {
            ClipboardType::Text => Some(WireClipboardType::Utf8Text),
        }
    }

    /// Diagnostic name.
    pub fn name(self) -> &'static str {
        match self {
            WireClipboardType::None => "none",
            WireClipboardType::Utf8Text => "text",
            WireClipboardType::ImagePng => "png",
            WireClipboardType::ImageBmp => "bmp",
            WireClipboardType::ImageTiff => "tiff",
            WireClipboardType::ImageJpg => "jpg",
        }
    }
}

impl TryFrom<u32> for WireClipboardType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireClipboardType::None),
            1 => Ok(WireClipboardType::Utf8Text),
            2 => Ok(WireClipboardType::ImagePng),
            3 => Ok(WireClipboardType::ImageBmp),
            4 => Ok(WireClipboardType::ImageTiff),
            5 => Ok(WireClipboardType::ImageJpg),
            _ => Err(()),
        }
    }
}

impl fmt::Display for WireClipboardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CLIPBOARD_GRAB (7): the sender owns the selection and offers these types.
///
/// `types` holds raw wire codes so that codes unknown to this host survive a
/// decode/encode round trip; receivers ignore what they cannot map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardGrabMessage {
    /// Present only when the selection capability was negotiated.
    pub selection: Option<Selection>,
    pub types: Vec<u32>,
}

/// CLIPBOARD_REQUEST (8): ask the owner for data of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardRequestMessage {
    pub selection: Option<Selection>,
    pub data_type: WireClipboardType,
}

/// CLIPBOARD (4): clipboard data of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardDataMessage {
    pub selection: Option<Selection>,
    pub data_type: WireClipboardType,
    pub data: Vec<u8>,
}

/// CLIPBOARD_RELEASE (9): the sender gives up ownership of the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardReleaseMessage {
    pub selection: Option<Selection>,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Every message the bridge sends or handles, discriminated by type.
///
/// Adding a message type means adding a variant here plus its payload codec;
/// the exhaustive matches in the codec and dispatcher point at every place
/// that needs a new arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMessage {
    MouseState(MouseStateMessage),
    AnnounceCapabilities(AnnounceCapabilitiesMessage),
    ClipboardGrab(ClipboardGrabMessage),
    ClipboardRequest(ClipboardRequestMessage),
    ClipboardData(ClipboardDataMessage),
    ClipboardRelease(ClipboardReleaseMessage),
}

impl AgentMessage {
    /// Returns the [`MessageType`] code for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            AgentMessage::MouseState(_) => MessageType::MouseState,
            AgentMessage::AnnounceCapabilities(_) => MessageType::AnnounceCapabilities,
            AgentMessage::ClipboardGrab(_) => MessageType::ClipboardGrab,
            AgentMessage::ClipboardRequest(_) => MessageType::ClipboardRequest,
            AgentMessage::ClipboardData(_) => MessageType::Clipboard,
            AgentMessage::ClipboardRelease(_) => MessageType::ClipboardRelease,
        }
    }
}
