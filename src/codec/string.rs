//! Variable-length scalars. Each value takes exactly one frame.
//!
//! # Example
//!
//! ```
//! use gridwire_client::codec::{ByteArrayCodec, StringCodec};
//! use gridwire_client::protocol::ClientMessage;
//!
//! let mut message = ClientMessage::for_encode();
//! StringCodec::encode(&mut message, "map-name");
//! ByteArrayCodec::encode(&mut message, &[1, 2, 3]);
//!
//! assert_eq!(StringCodec::decode(&mut message).unwrap(), "map-name");
//! assert_eq!(&ByteArrayCodec::decode(&mut message).unwrap()[..], &[1, 2, 3]);
//! ```

use bytes::Bytes;

use super::util::required_frame;
use crate::error::{GridwireError, Result};
use crate::protocol::{flags, ClientMessage, Frame};

/// UTF-8 string in a frame of its own.
pub struct StringCodec;

impl StringCodec {
    pub fn encode(message: &mut ClientMessage, value: &str) {
        message.add_frame(Frame::from_slice(value.as_bytes(), flags::DEFAULT_FLAGS));
    }

    /// Consume the next frame and decode it as UTF-8.
    pub fn decode(message: &mut ClientMessage) -> Result<String> {
        let frame = required_frame(message)?;
        String::from_utf8(frame.content.to_vec())
            .map_err(|e| GridwireError::codec(format!("invalid UTF-8 in string frame: {e}")))
    }
}

/// Opaque byte array in a frame of its own.
pub struct ByteArrayCodec;

impl ByteArrayCodec {
    pub fn encode(message: &mut ClientMessage, value: &[u8]) {
        message.add_frame(Frame::from_slice(value, flags::DEFAULT_FLAGS));
    }

    /// Encode an existing `Bytes` without copying it.
    pub fn encode_bytes(message: &mut ClientMessage, value: Bytes) {
        message.add_frame(Frame::new(value, flags::DEFAULT_FLAGS));
    }

    /// Consume the next frame. The returned `Bytes` shares the frame's buffer.
    pub fn decode(message: &mut ClientMessage) -> Result<Bytes> {
        required_frame(message).map(|frame| frame.content)
    }
}
