//! Wire format encoding and decoding.
//!
//! Every frame on the wire starts with a 6-byte header:
//! ```text
//! ┌──────────────┬──────────┬─────────────────┐
//! │ Frame length │ Flags    │ Content         │
//! │ 4 bytes      │ 2 bytes  │ length - 6 bytes│
//! │ int32 LE     │ uint16 LE│                 │
//! └──────────────┴──────────┴─────────────────┘
//! ```
//!
//! The frame length includes the header itself. A message is a run of frames
//! terminated by the first frame carrying [`flags::IS_FINAL`].
//!
//! All multi-byte integers are Little Endian.

use crate::error::{GridwireError, Result};

/// Size of the frame length and flags fields (fixed, exactly 6).
pub const SIZE_OF_FRAME_LENGTH_AND_FLAGS: usize = INT_SIZE_IN_BYTES + SHORT_SIZE_IN_BYTES;

/// Default maximum frame length (max i32).
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = i32::MAX as u32;

pub const BYTE_SIZE_IN_BYTES: usize = 1;
pub const BOOLEAN_SIZE_IN_BYTES: usize = 1;
pub const SHORT_SIZE_IN_BYTES: usize = 2;
pub const INT_SIZE_IN_BYTES: usize = 4;
pub const LONG_SIZE_IN_BYTES: usize = 8;
/// Nullability byte followed by the two 64-bit halves.
pub const UUID_SIZE_IN_BYTES: usize = BOOLEAN_SIZE_IN_BYTES + 2 * LONG_SIZE_IN_BYTES;

/// Offsets inside the header frame (the first frame of every message).
pub mod offsets {
    use super::{INT_SIZE_IN_BYTES, LONG_SIZE_IN_BYTES};

    pub const MESSAGE_TYPE: usize = 0;
    pub const CORRELATION_ID: usize = MESSAGE_TYPE + INT_SIZE_IN_BYTES;
    /// Requests only. Shares its offset with [`RESPONSE_BACKUP_ACKS`].
    pub const PARTITION_ID: usize = CORRELATION_ID + LONG_SIZE_IN_BYTES;
    /// Responses only. Shares its offset with [`PARTITION_ID`].
    pub const RESPONSE_BACKUP_ACKS: usize = CORRELATION_ID + LONG_SIZE_IN_BYTES;
    /// Offset of the fragmentation id inside a fragmentation frame.
    pub const FRAGMENTATION_ID: usize = 0;

    /// Smallest request header frame: type, correlation id, partition id.
    pub const REQUEST_HEADER_SIZE: usize = PARTITION_ID + INT_SIZE_IN_BYTES;
    /// Smallest response header frame: type, correlation id, backup acks.
    pub const RESPONSE_HEADER_SIZE: usize = RESPONSE_BACKUP_ACKS + 1;
}

/// Flag constants for the protocol.
pub mod flags {
    /// No flags set.
    pub const DEFAULT_FLAGS: u16 = 0;
    /// First wire fragment of a split message.
    pub const BEGIN_FRAGMENT: u16 = 1 << 15;
    /// Last wire fragment of a split message.
    pub const END_FRAGMENT: u16 = 1 << 14;
    /// Both fragment bits: the message was never split.
    pub const UNFRAGMENTED_MESSAGE: u16 = BEGIN_FRAGMENT | END_FRAGMENT;
    /// Last frame of a message. Stamped only at write time.
    pub const IS_FINAL: u16 = 1 << 13;
    /// Opens a composite value (list, map, record).
    pub const BEGIN_DATA_STRUCTURE: u16 = 1 << 12;
    /// Closes a composite value.
    pub const END_DATA_STRUCTURE: u16 = 1 << 11;
    /// Zero-length sentinel for an absent value.
    pub const IS_NULL: u16 = 1 << 10;
    /// Server-pushed event rather than a response.
    pub const IS_EVENT: u16 = 1 << 9;
    /// Caller wants backup-ack accounting.
    pub const IS_BACKUP_AWARE: u16 = 1 << 8;
    /// Backup acknowledgement event.
    pub const IS_BACKUP_EVENT: u16 = 1 << 7;

    /// Check if every bit of `mask` is set in `flags`.
    #[inline]
    pub fn has_flag(flags: u16, mask: u16) -> bool {
        flags & mask == mask
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length in bytes, header included.
    pub frame_length: i32,
    /// Flags (see [`flags`]).
    pub flags: u16,
}

impl FrameHeader {
    /// Create a header for a frame carrying `content_length` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the frame length does not fit the `i32` length field.
    pub fn for_content(content_length: usize, flags: u16) -> Self {
        let frame_length = content_length
            .checked_add(SIZE_OF_FRAME_LENGTH_AND_FLAGS)
            .and_then(|length| i32::try_from(length).ok())
            .unwrap_or_else(|| {
                panic!("frame content of {content_length} bytes exceeds the i32 length field")
            });
        Self { frame_length, flags }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use gridwire_client::protocol::{flags, FrameHeader};
    ///
    /// let header = FrameHeader::for_content(4, flags::IS_FINAL);
    /// assert_eq!(header.encode(), [10, 0, 0, 0, 0x00, 0x20]);
    /// ```
    pub fn encode(&self) -> [u8; SIZE_OF_FRAME_LENGTH_AND_FLAGS] {
        let mut buf = [0u8; SIZE_OF_FRAME_LENGTH_AND_FLAGS];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than 6 bytes.
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= SIZE_OF_FRAME_LENGTH_AND_FLAGS);
        buf[0..4].copy_from_slice(&self.frame_length.to_le_bytes());
        buf[4..6].copy_from_slice(&self.flags.to_le_bytes());
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < SIZE_OF_FRAME_LENGTH_AND_FLAGS {
            return None;
        }
        Some(Self {
            frame_length: i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            flags: u16::from_le_bytes([buf[4], buf[5]]),
        })
    }

    /// Validate the header and return the content length.
    ///
    /// Checks:
    /// - Frame length covers at least the header itself
    /// - Frame length doesn't exceed max
    pub fn validate(&self, max_frame_length: u32) -> Result<usize> {
        if self.frame_length < SIZE_OF_FRAME_LENGTH_AND_FLAGS as i32 {
            return Err(GridwireError::Protocol(format!(
                "Frame length {} is smaller than the frame header",
                self.frame_length
            )));
        }

        if self.frame_length as u32 > max_frame_length {
            return Err(GridwireError::Protocol(format!(
                "Frame length {} exceeds maximum {}",
                self.frame_length, max_frame_length
            )));
        }

        Ok(self.frame_length as usize - SIZE_OF_FRAME_LENGTH_AND_FLAGS)
    }

    /// Check if this is the last frame of a message.
    #[inline]
    pub fn is_final(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_FINAL)
    }
}

/// Encode a frame header for `content_length` bytes (standalone function).
#[inline]
pub fn encode_frame_header(content_length: usize, flags: u16) -> [u8; SIZE_OF_FRAME_LENGTH_AND_FLAGS] {
    FrameHeader::for_content(content_length, flags).encode()
}

/// Decode a frame header from bytes (standalone function).
#[inline]
pub fn decode_frame_header(buf: &[u8]) -> Option<FrameHeader> {
    FrameHeader::decode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_little_endian_byte_order() {
        let header = FrameHeader {
            frame_length: 0x0403_0201,
            flags: 0x0605,
        };
        assert_eq!(header.encode(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_header_size_is_exactly_6() {
        assert_eq!(SIZE_OF_FRAME_LENGTH_AND_FLAGS, 6);
        assert_eq!(encode_frame_header(0, 0).len(), 6);
    }

    #[test]
    fn test_frame_length_includes_header() {
        let header = FrameHeader::for_content(10, flags::DEFAULT_FLAGS);
        assert_eq!(header.frame_length, 16);
        assert_eq!(header.validate(DEFAULT_MAX_FRAME_LENGTH).unwrap(), 10);
    }

    #[test]
    fn test_largest_frame_length() {
        let content = i32::MAX as usize - SIZE_OF_FRAME_LENGTH_AND_FLAGS;
        assert_eq!(FrameHeader::for_content(content, 0).frame_length, i32::MAX);
    }

    #[test]
    #[should_panic(expected = "exceeds the i32 length field")]
    fn test_content_overflowing_length_field_panics() {
        FrameHeader::for_content(i32::MAX as usize, 0);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(decode_frame_header(&[0u8; 5]).is_none());
    }

    #[test]
    fn test_validate_length_below_header_rejected() {
        let header = FrameHeader {
            frame_length: 5,
            flags: 0,
        };
        let err = header.validate(DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(err.to_string().contains("smaller than the frame header"));

        let negative = FrameHeader {
            frame_length: -1,
            flags: 0,
        };
        assert!(negative.validate(DEFAULT_MAX_FRAME_LENGTH).is_err());
    }

    #[test]
    fn test_validate_length_too_large() {
        let header = FrameHeader::for_content(1000, 0);
        let err = header.validate(100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_flag_bit_positions() {
        assert_eq!(flags::BEGIN_FRAGMENT, 0x8000);
        assert_eq!(flags::END_FRAGMENT, 0x4000);
        assert_eq!(flags::UNFRAGMENTED_MESSAGE, 0xC000);
        assert_eq!(flags::IS_FINAL, 0x2000);
        assert_eq!(flags::BEGIN_DATA_STRUCTURE, 0x1000);
        assert_eq!(flags::END_DATA_STRUCTURE, 0x0800);
        assert_eq!(flags::IS_NULL, 0x0400);
        assert_eq!(flags::IS_EVENT, 0x0200);
        assert_eq!(flags::IS_BACKUP_AWARE, 0x0100);
        assert_eq!(flags::IS_BACKUP_EVENT, 0x0080);
    }

    #[test]
    fn test_has_flag_requires_all_bits() {
        assert!(flags::has_flag(flags::UNFRAGMENTED_MESSAGE, flags::BEGIN_FRAGMENT));
        assert!(!flags::has_flag(flags::BEGIN_FRAGMENT, flags::UNFRAGMENTED_MESSAGE));
        assert!(flags::has_flag(
            flags::UNFRAGMENTED_MESSAGE | flags::IS_FINAL,
            flags::UNFRAGMENTED_MESSAGE
        ));
    }

    #[test]
    fn test_header_offsets() {
        assert_eq!(offsets::CORRELATION_ID, 4);
        assert_eq!(offsets::PARTITION_ID, 12);
        assert_eq!(offsets::RESPONSE_BACKUP_ACKS, offsets::PARTITION_ID);
        assert_eq!(offsets::REQUEST_HEADER_SIZE, 16);
    }
}
