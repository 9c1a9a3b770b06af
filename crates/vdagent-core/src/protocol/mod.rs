//! Protocol module containing message types, the binary codec and the
//! stream reassembler.

pub mod codec;
pub mod messages;
pub mod reassembly;

pub use codec::{
    decode_chunk, decode_message, decode_payload, encode_agent_message, encode_frame,
    encode_message, encode_payload, ChunkHeader, Frame, ProtocolError, RawMessage,
};
pub use messages::*;
pub use reassembly::StreamReassembler;
