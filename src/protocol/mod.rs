//! Protocol module - wire format, frames, messages and inbound assembly.
//!
//! This module implements the binary client protocol:
//! - 6-byte frame header encoding/decoding
//! - Frame and message model
//! - Message serialization
//! - Incremental message reader for partial reads
//! - Fragment reassembly

mod fragment;
mod frame;
mod message;
mod reader;
mod serializer;
mod wire_format;

pub use fragment::{FragmentedMessageHandler, DEFAULT_MAX_IN_FLIGHT_FRAGMENTED};
pub use frame::Frame;
pub use message::{
    request_header_size, response_header_size, ClientMessage, Direction, MessageHeader,
};
pub use reader::ClientMessageReader;
pub use serializer::wire_size;
pub use wire_format::{
    decode_frame_header, encode_frame_header, flags, offsets, FrameHeader, BOOLEAN_SIZE_IN_BYTES,
    BYTE_SIZE_IN_BYTES, DEFAULT_MAX_FRAME_LENGTH, INT_SIZE_IN_BYTES, LONG_SIZE_IN_BYTES,
    SHORT_SIZE_IN_BYTES, SIZE_OF_FRAME_LENGTH_AND_FLAGS, UUID_SIZE_IN_BYTES,
};
