//! Binary codec for the guest-agent wire protocol.
//!
//! Wire format:
//! ```text
//! chunk:   [port:4][size:4][message:size]
//! message: [protocol:4][type:4][opaque:8][size:4][payload:size]
//! ```
//! Chunk header: 8 bytes.  Message header: 20 bytes.  All multi-byte integers
//! are little-endian, matching the guest agent's native layout.
//!
//! The codec is split in three layers that callers combine as needed:
//!
//! 1. [`decode_chunk`] / [`encode_frame`] handle the outer chunk wrapper.
//! 2. [`decode_message`] / [`encode_message`] handle the message header and
//!    produce an untyped [`RawMessage`].
//! 3. [`decode_payload`] / [`encode_payload`] convert between a
//!    [`RawMessage`] and a typed [`AgentMessage`].

use thiserror::Error;

use crate::domain::clipboard::Selection;
use crate::protocol::messages::{
    AgentMessage, AnnounceCapabilitiesMessage, ClipboardDataMessage, ClipboardGrabMessage,
    ClipboardReleaseMessage, ClipboardRequestMessage, MessageType, MouseButtons,
    MouseStateMessage, WireClipboardType, AGENT_PROTOCOL, CHUNK_HEADER_SIZE, CLIENT_PORT,
    MESSAGE_HEADER_SIZE, SELECTION_HEADER_SIZE,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Not enough bytes yet.  Only the chunk layer reports this; it means
    /// "wait for more input", not "the guest misbehaved".
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type code is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u32),

    /// The message type is valid but the bridge does not handle it.
    #[error("unsupported message: {0}")]
    UnsupportedMessage(MessageType),

    /// The protocol field in the message header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u32),

    /// The payload could not be parsed (bad selection, unknown clipboard type, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The message header's size field does not match the bytes in the chunk.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// A chunk declares more bytes than the receive buffer can ever hold.
    #[error("frame too large: declared {declared} bytes, capacity is {capacity}")]
    FrameTooLarge { declared: usize, capacity: usize },
}

impl ProtocolError {
    /// Returns `true` for errors that must tear down the session.
    ///
    /// Every other error only invalidates the message it was raised for.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::FrameTooLarge { .. })
    }
}

// ── Wire units ────────────────────────────────────────────────────────────────

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub port: u32,
    pub size: u32,
}

/// One complete chunk: the port it was sent on and the message bytes it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub port: u32,
    pub payload: Vec<u8>,
}

/// A message with a validated header and an uninterpreted payload.
///
/// The protocol field is not stored: decoding rejects anything but
/// [`AGENT_PROTOCOL`] and encoding always stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Raw type code (see [`MessageType`]).
    pub message_type: u32,
    /// Opaque value carried through unchanged; zero on host-originated messages.
    pub opaque: u64,
    /// Type-specific payload.
    pub data: Vec<u8>,
}

// ── Chunk layer ───────────────────────────────────────────────────────────────

/// Reads a chunk header and returns it together with a view of its payload.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when `bytes` holds less than
/// the header or less than the payload the header declares.
///
/// # Examples
///
/// ```rust
/// use vdagent_core::protocol::codec::{decode_chunk, encode_frame};
///
/// let wire = encode_frame(1, b"abc");
/// let (header, payload) = decode_chunk(&wire).unwrap();
/// assert_eq!(header.port, 1);
/// assert_eq!(payload, b"abc");
/// assert!(decode_chunk(&wire[..wire.len() - 1]).is_err());
/// ```
pub fn decode_chunk(bytes: &[u8]) -> Result<(ChunkHeader, &[u8]), ProtocolError> {
    let header = peek_chunk_header(bytes).ok_or(ProtocolError::InsufficientData {
        needed: CHUNK_HEADER_SIZE,
        available: bytes.len(),
    })?;

    let total = CHUNK_HEADER_SIZE + header.size as usize;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }
    Ok((header, &bytes[CHUNK_HEADER_SIZE..total]))
}

/// Reads just the chunk header, or `None` if fewer than 8 bytes are present.
pub fn peek_chunk_header(bytes: &[u8]) -> Option<ChunkHeader> {
    if bytes.len() < CHUNK_HEADER_SIZE {
        return None;
    }
    Some(ChunkHeader {
        port: read_u32(bytes, 0),
        size: read_u32(bytes, 4),
    })
}

/// Prepends a chunk header for `port` to `payload`.
pub fn encode_frame(port: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&port.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

// ── Message layer ─────────────────────────────────────────────────────────────

/// Decodes the message carried by one chunk.
///
/// # Errors
///
/// - [`ProtocolError::MalformedPayload`] if `bytes` is shorter than the
///   message header.
/// - [`ProtocolError::UnsupportedVersion`] if the protocol field is not 1.
/// - [`ProtocolError::PayloadLengthMismatch`] if the declared size differs
///   from the bytes that follow the header.
///
/// # Examples
///
/// ```rust
/// use vdagent_core::protocol::codec::{decode_message, encode_message, RawMessage};
///
/// let original = RawMessage { message_type: 9, opaque: 0, data: vec![] };
/// let bytes = encode_message(&original);
/// assert_eq!(decode_message(&bytes).unwrap(), original);
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<RawMessage, ProtocolError> {
    require_len(bytes, MESSAGE_HEADER_SIZE, "message header")?;

    let protocol = read_u32(bytes, 0);
    if protocol != AGENT_PROTOCOL {
        return Err(ProtocolError::UnsupportedVersion(protocol));
    }

    let message_type = read_u32(bytes, 4);
    let opaque = read_u64(bytes, 8);
    let declared = read_u32(bytes, 16) as usize;

    let available = bytes.len() - MESSAGE_HEADER_SIZE;
    if declared != available {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared,
            available,
        });
    }

    Ok(RawMessage {
        message_type,
        opaque,
        data: bytes[MESSAGE_HEADER_SIZE..].to_vec(),
    })
}

/// Encodes a message header plus payload, stamping [`AGENT_PROTOCOL`].
pub fn encode_message(msg: &RawMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MESSAGE_HEADER_SIZE + msg.data.len());

    // Header: protocol (4) + type (4) + opaque (8) + size (4) = 20 bytes
    buf.extend_from_slice(&AGENT_PROTOCOL.to_le_bytes());
    buf.extend_from_slice(&msg.message_type.to_le_bytes());
    buf.extend_from_slice(&msg.opaque.to_le_bytes());
    buf.extend_from_slice(&(msg.data.len() as u32).to_le_bytes());

    buf.extend_from_slice(&msg.data);
    buf
}

/// Encodes `msg` into complete wire bytes (chunk header, message header and
/// payload) addressed to the client port.
///
/// # Examples
///
/// ```rust
/// use vdagent_core::protocol::codec::encode_agent_message;
/// use vdagent_core::protocol::messages::{AgentMessage, ClipboardReleaseMessage};
///
/// let bytes = encode_agent_message(&AgentMessage::ClipboardRelease(
///     ClipboardReleaseMessage { selection: None },
/// ));
/// assert_eq!(bytes.len(), 8 + 20);
/// ```
pub fn encode_agent_message(msg: &AgentMessage) -> Vec<u8> {
    encode_frame(CLIENT_PORT, &encode_message(&encode_payload(msg)))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

/// Converts a typed message into a [`RawMessage`] with a zero opaque field.
///
/// A selection header is written whenever the message carries a selection;
/// callers set it only when the selection capability was negotiated.
pub fn encode_payload(msg: &AgentMessage) -> RawMessage {
    let mut buf = Vec::new();
    match msg {
        AgentMessage::MouseState(m) => encode_mouse_state(&mut buf, m),
        AgentMessage::AnnounceCapabilities(m) => encode_announce(&mut buf, m),
        AgentMessage::ClipboardGrab(m) => {
            write_selection(&mut buf, m.selection);
            for ty in &m.types {
                buf.extend_from_slice(&ty.to_le_bytes());
            }
        }
        AgentMessage::ClipboardRequest(m) => {
            write_selection(&mut buf, m.selection);
            buf.extend_from_slice(&(m.data_type as u32).to_le_bytes());
        }
        AgentMessage::ClipboardData(m) => {
            write_selection(&mut buf, m.selection);
            buf.extend_from_slice(&(m.data_type as u32).to_le_bytes());
            buf.extend_from_slice(&m.data);
        }
        AgentMessage::ClipboardRelease(m) => write_selection(&mut buf, m.selection),
    }
    RawMessage {
        message_type: msg.message_type() as u32,
        opaque: 0,
        data: buf,
    }
}

fn encode_mouse_state(buf: &mut Vec<u8>, m: &MouseStateMessage) {
    buf.extend_from_slice(&m.x.to_le_bytes());
    buf.extend_from_slice(&m.y.to_le_bytes());
    buf.extend_from_slice(&m.buttons.0.to_le_bytes());
    buf.push(m.display_id);
}

fn encode_announce(buf: &mut Vec<u8>, m: &AnnounceCapabilitiesMessage) {
    buf.extend_from_slice(&u32::from(m.request).to_le_bytes());
    for word in &m.caps {
        buf.extend_from_slice(&word.to_le_bytes());
    }
}

fn write_selection(buf: &mut Vec<u8>, selection: Option<Selection>) {
    if let Some(selection) = selection {
        buf.push(selection as u8);
        buf.extend_from_slice(&[0u8; SELECTION_HEADER_SIZE - 1]);
    }
}

// ── Payload decoding ──────────────────────────────────────────────────────────

/// Interprets the payload of `raw` according to its type code.
///
/// `selection_enabled` tells whether clipboard payloads start with a
/// selection header (it depends on the negotiated capabilities).
///
/// # Errors
///
/// - [`ProtocolError::UnknownMessageType`] for codes outside the protocol.
/// - [`ProtocolError::UnsupportedMessage`] for protocol messages the bridge
///   does not handle.
/// - [`ProtocolError::MalformedPayload`] for truncated payloads, bad
///   selection codes and unknown clipboard types in REQUEST or CLIPBOARD.
pub fn decode_payload(raw: &RawMessage, selection_enabled: bool) -> Result<AgentMessage, ProtocolError> {
    let msg_type = MessageType::try_from(raw.message_type)
        .map_err(|_| ProtocolError::UnknownMessageType(raw.message_type))?;
    let p = raw.data.as_slice();

    match msg_type {
        MessageType::MouseState => decode_mouse_state(p).map(AgentMessage::MouseState),
        MessageType::AnnounceCapabilities => {
            decode_announce(p).map(AgentMessage::AnnounceCapabilities)
        }
        MessageType::ClipboardGrab => {
            let (selection, rest) = read_selection(p, selection_enabled, "ClipboardGrab")?;
            let types = read_u32_words(rest, "ClipboardGrab.types")?;
            Ok(AgentMessage::ClipboardGrab(ClipboardGrabMessage { selection, types }))
        }
        MessageType::ClipboardRequest => {
            let (selection, rest) = read_selection(p, selection_enabled, "ClipboardRequest")?;
            require_len(rest, 4, "ClipboardRequest.type")?;
            let data_type = read_wire_type(rest)?;
            Ok(AgentMessage::ClipboardRequest(ClipboardRequestMessage { selection, data_type }))
        }
        MessageType::Clipboard => {
            let (selection, rest) = read_selection(p, selection_enabled, "Clipboard")?;
            require_len(rest, 4, "Clipboard.type")?;
            let data_type = read_wire_type(rest)?;
            Ok(AgentMessage::ClipboardData(ClipboardDataMessage {
                selection,
                data_type,
                data: rest[4..].to_vec(),
            }))
        }
        MessageType::ClipboardRelease => {
            let (selection, _) = read_selection(p, selection_enabled, "ClipboardRelease")?;
            Ok(AgentMessage::ClipboardRelease(ClipboardReleaseMessage { selection }))
        }
        MessageType::MonitorsConfig
        | MessageType::Reply
        | MessageType::DisplayConfig
        | MessageType::FileXferStart
        | MessageType::FileXferStatus
        | MessageType::FileXferData
        | MessageType::ClientDisconnected
        | MessageType::MaxClipboard
        | MessageType::AudioVolumeSync
        | MessageType::GraphicsDeviceInfo => Err(ProtocolError::UnsupportedMessage(msg_type)),
    }
}

fn decode_mouse_state(p: &[u8]) -> Result<MouseStateMessage, ProtocolError> {
    // 4 (x) + 4 (y) + 4 (buttons) + 1 (display) = 13
    require_len(p, 13, "MouseState")?;
    Ok(MouseStateMessage {
        x: read_u32(p, 0),
        y: read_u32(p, 4),
        buttons: MouseButtons(read_u32(p, 8)),
        display_id: p[12],
    })
}

fn decode_announce(p: &[u8]) -> Result<AnnounceCapabilitiesMessage, ProtocolError> {
    require_len(p, 4, "AnnounceCapabilities")?;
    let request = read_u32(p, 0) != 0;
    let caps = read_u32_words(&p[4..], "AnnounceCapabilities.caps")?;
    Ok(AnnounceCapabilitiesMessage { request, caps })
}

/// Splits off the selection header when `enabled`; returns `None` otherwise.
fn read_selection<'a>(
    p: &'a [u8],
    enabled: bool,
    context: &str,
) -> Result<(Option<Selection>, &'a [u8]), ProtocolError> {
    if !enabled {
        return Ok((None, p));
    }
    require_len(p, SELECTION_HEADER_SIZE, context)?;
    let selection = Selection::try_from(p[0]).map_err(|_| {
        ProtocolError::MalformedPayload(format!("{context}: unknown selection: {}", p[0]))
    })?;
    Ok((Some(selection), &p[SELECTION_HEADER_SIZE..]))
}

fn read_wire_type(p: &[u8]) -> Result<WireClipboardType, ProtocolError> {
    let code = read_u32(p, 0);
    WireClipboardType::try_from(code)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown clipboard type: {code}")))
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

/// Reads a little-endian `u32`.  Callers check the length first.
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(word)
}

fn read_u32_words(buf: &[u8], context: &str) -> Result<Vec<u32>, ProtocolError> {
    if buf.len() % 4 != 0 {
        return Err(ProtocolError::MalformedPayload(format!(
            "{context}: {} bytes is not a whole number of words",
            buf.len()
        )));
    }
    Ok(buf.chunks_exact(4).map(|w| read_u32(w, 0)).collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
