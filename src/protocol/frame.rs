//! Frame struct with typed flag accessors.
//!
//! A frame is the atomic wire unit: a content buffer plus a 16-bit flag set.
//! Uses `bytes::Bytes` so that shallow copies share their content.
//!
//! # Example
//!
//! ```
//! use gridwire_client::protocol::{flags, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Bytes::from_static(b"hello"), flags::DEFAULT_FLAGS);
//! assert_eq!(frame.content(), b"hello");
//! assert_eq!(frame.wire_length(), 6 + 5);
//!
//! assert!(Frame::null().is_null_frame());
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{flags, SIZE_OF_FRAME_LENGTH_AND_FLAGS};

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Content bytes (zero-copy via `bytes::Bytes`).
    pub content: Bytes,
    /// Logical flags. `IS_FINAL` is added by the serializer, not stored here.
    pub flags: u16,
}

impl Frame {
    /// Create a new frame from content and flags.
    pub fn new(content: Bytes, flags: u16) -> Self {
        debug_assert!(
            !(flags::has_flag(flags, flags::BEGIN_DATA_STRUCTURE)
                && flags::has_flag(flags, flags::END_DATA_STRUCTURE)),
            "a frame cannot both begin and end a data structure"
        );
        Self { content, flags }
    }

    /// Create a frame from raw bytes (copies data).
    pub fn from_slice(content: &[u8], flags: u16) -> Self {
        Self::new(Bytes::copy_from_slice(content), flags)
    }

    /// Create a zero-filled header frame of `size` bytes, flagged as unfragmented.
    pub fn initial(size: usize) -> Self {
        Self::initial_with_flags(size, flags::UNFRAGMENTED_MESSAGE)
    }

    /// Create a zero-filled header frame of `size` bytes with explicit flags.
    pub fn initial_with_flags(size: usize, flags: u16) -> Self {
        Self::new(BytesMut::zeroed(size).freeze(), flags)
    }

    /// The `NULL` sentinel: an absent value.
    #[inline]
    pub fn null() -> Self {
        Self::new(Bytes::new(), flags::IS_NULL)
    }

    /// The `BEGIN` sentinel: opens a data structure.
    #[inline]
    pub fn begin() -> Self {
        Self::new(Bytes::new(), flags::BEGIN_DATA_STRUCTURE)
    }

    /// The `END` sentinel: closes a data structure.
    #[inline]
    pub fn end() -> Self {
        Self::new(Bytes::new(), flags::END_DATA_STRUCTURE)
    }

    /// Get a reference to the content bytes.
    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Number of bytes this frame occupies on the wire.
    #[inline]
    pub fn wire_length(&self) -> usize {
        SIZE_OF_FRAME_LENGTH_AND_FLAGS + self.content.len()
    }

    /// Shallow copy: the new frame shares this frame's content buffer.
    #[inline]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Deep copy: the new frame owns a fresh copy of the content.
    pub fn deep_copy(&self) -> Self {
        Self {
            content: Bytes::copy_from_slice(&self.content),
            flags: self.flags,
        }
    }

    /// Rewrite the content in place, copying it first if it is shared.
    ///
    /// Other holders of the old buffer never observe the change.
    pub fn update_content<F>(&mut self, f: F)
    where
        F: FnOnce(&mut [u8]),
    {
        let mut buf = BytesMut::from(&self.content[..]);
        f(&mut buf);
        self.content = buf.freeze();
    }

    #[inline]
    pub fn add_flag(&mut self, flag: u16) {
        self.flags |= flag;
    }

    #[inline]
    pub fn is_begin_frame(&self) -> bool {
        flags::has_flag(self.flags, flags::BEGIN_DATA_STRUCTURE)
    }

    #[inline]
    pub fn is_end_frame(&self) -> bool {
        flags::has_flag(self.flags, flags::END_DATA_STRUCTURE)
    }

    #[inline]
    pub fn is_null_frame(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_NULL)
    }

    #[inline]
    pub fn has_event_flag(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_EVENT)
    }

    #[inline]
    pub fn has_backup_event_flag(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_BACKUP_EVENT)
    }

    #[inline]
    pub fn has_backup_aware_flag(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_BACKUP_AWARE)
    }

    /// Check if `IS_FINAL` is set. The serializer stamps it on the wire and the
    /// reader clears it again, so frames held in a message normally lack it.
    #[inline]
    pub fn is_final_frame(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_FINAL)
    }

    /// Check if both fragment bits are set.
    #[inline]
    pub fn has_unfragmented_message_flag(&self) -> bool {
        flags::has_flag(self.flags, flags::UNFRAGMENTED_MESSAGE)
    }

    #[inline]
    pub fn has_begin_fragment_flag(&self) -> bool {
        flags::has_flag(self.flags, flags::BEGIN_FRAGMENT)
    }

    #[inline]
    pub fn has_end_fragment_flag(&self) -> bool {
        flags::has_flag(self.flags, flags::END_FRAGMENT)
    }
}
