//! Message to wire bytes.
//!
//! Each frame is written as its 6-byte header followed by its content:
//! ```text
//! ┌───────────┬───────┬─────────┐┌───────────┬────────────────────┬─────────┐
//! │ len (i32) │ flags │ content ││ len (i32) │ flags | IS_FINAL   │ content │
//! └───────────┴───────┴─────────┘└───────────┴────────────────────┴─────────┘
//!   header frame                   ...          last frame
//! ```
//!
//! `IS_FINAL` exists only on the wire. It is OR-ed into the last frame's
//! flags while writing; the frame stored in the message is not modified.

use bytes::{Bytes, BytesMut};

use super::message::ClientMessage;
use super::wire_format::{flags, FrameHeader, SIZE_OF_FRAME_LENGTH_AND_FLAGS};

impl ClientMessage {
    /// Append the wire form of this message to `buf`.
    ///
    /// Reserves [`ClientMessage::total_length`] bytes up front so the whole
    /// message is written without reallocating.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.total_length());

        let last = self.frame_count().saturating_sub(1);
        for (index, frame) in self.frames().enumerate() {
            let mut frame_flags = frame.flags;
            if index == last {
                frame_flags |= flags::IS_FINAL;
            }

            let header = FrameHeader::for_content(frame.content.len(), frame_flags);
            buf.extend_from_slice(&header.encode());
            buf.extend_from_slice(&frame.content);
        }
    }

    /// Serialize this message into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.total_length());
        self.write_to(&mut buf);
        buf.freeze()
    }
}

/// Number of bytes `frames` frames with `content_length` total content take.
#[inline]
pub fn wire_size(frames: usize, content_length: usize) -> usize {
    frames * SIZE_OF_FRAME_LENGTH_AND_FLAGS + content_length
}
