//! Client message: an ordered chain of frames.
//!
//! A [`ClientMessage`] is one logical request, response or event. Its first
//! frame is the header frame, which carries the message type and correlation
//! id at fixed offsets. Offset 12 holds the partition id for requests and
//! events but the backup-ack count for responses, so it must be read through
//! [`ClientMessage::header`] with the message's [`Direction`].
//!
//! Frames are kept in an owned `VecDeque`; the decode cursor is an index into
//! it. Dropping the fragmentation frame and merging fragments never copy
//! content, only the `Bytes` handles.
//!
//! # Example
//!
//! ```
//! use gridwire_client::protocol::{ClientMessage, Frame};
//! use gridwire_client::protocol::offsets::REQUEST_HEADER_SIZE;
//!
//! let mut message = ClientMessage::for_encode();
//! message.add_frame(Frame::initial(REQUEST_HEADER_SIZE));
//! message.set_message_type(0x0100).unwrap();
//! message.set_correlation_id(7).unwrap();
//! message.set_partition_id(-1).unwrap();
//!
//! assert_eq!(message.correlation_id().unwrap(), 7);
//! assert_eq!(message.total_length(), 6 + REQUEST_HEADER_SIZE);
//! ```

use std::collections::VecDeque;

use super::frame::Frame;
use super::wire_format::{
    offsets, BYTE_SIZE_IN_BYTES, INT_SIZE_IN_BYTES, LONG_SIZE_IN_BYTES,
};
use crate::codec::fixed;
use crate::error::{GridwireError, Result};

/// Which way a message travels. Decides how the header frame is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    Request,
    /// Server reply to a request.
    Response,
    /// Server-pushed event.
    Event,
}

/// Decoded header frame fields, interpreted for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageHeader {
    Request {
        message_type: i32,
        correlation_id: i64,
        partition_id: i32,
    },
    Response {
        message_type: i32,
        correlation_id: i64,
        backup_acks: u8,
    },
    Event {
        message_type: i32,
        correlation_id: i64,
        partition_id: i32,
    },
}

impl MessageHeader {
    pub fn message_type(&self) -> i32 {
        match *self {
            MessageHeader::Request { message_type, .. }
            | MessageHeader::Response { message_type, .. }
            | MessageHeader::Event { message_type, .. } => message_type,
        }
    }

    pub fn correlation_id(&self) -> i64 {
        match *self {
            MessageHeader::Request { correlation_id, .. }
            | MessageHeader::Response { correlation_id, .. }
            | MessageHeader::Event { correlation_id, .. } => correlation_id,
        }
    }
}

/// One logical protocol message.
#[derive(Debug, Clone, Default)]
pub struct ClientMessage {
    frames: VecDeque<Frame>,
    /// Index of the frame `next_frame` will return.
    cursor: usize,
    /// Sum of frame wire lengths, kept in step with `frames`.
    total_length: usize,
    retryable: bool,
    operation_name: Option<String>,
}

impl ClientMessage {
    /// Create an empty message to be filled by an encoder.
    pub fn for_encode() -> Self {
        Self::default()
    }

    /// Create a message over already received frames, cursor at the start.
    pub fn for_decode<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Frame>,
    {
        let frames: VecDeque<Frame> = frames.into_iter().collect();
        let total_length = frames.iter().map(Frame::wire_length).sum();
        Self {
            frames,
            total_length,
            ..Self::default()
        }
    }

    /// Append a frame to the end of the chain.
    pub fn add_frame(&mut self, frame: Frame) {
        self.total_length += frame.wire_length();
        self.frames.push_back(frame);
    }

    /// The header frame, if any frame has been added.
    #[inline]
    pub fn start_frame(&self) -> Option<&Frame> {
        self.frames.front()
    }

    #[inline]
    pub fn end_frame(&self) -> Option<&Frame> {
        self.frames.back()
    }

    /// Iterate over all frames in order, independent of the cursor.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.frames.iter()
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Return the frame under the cursor and advance past it.
    pub fn next_frame(&mut self) -> Option<&Frame> {
        let frame = self.frames.get(self.cursor)?;
        self.cursor += 1;
        Some(frame)
    }

    /// Return the frame under the cursor without consuming it.
    #[inline]
    pub fn peek_next_frame(&self) -> Option<&Frame> {
        self.frames.get(self.cursor)
    }

    #[inline]
    pub fn has_next_frame(&self) -> bool {
        self.cursor < self.frames.len()
    }

    /// Move the cursor back to the header frame.
    #[inline]
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Total number of bytes this message occupies on the wire.
    #[inline]
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn message_type(&self) -> Result<i32> {
        fixed::decode_int(self.header_content()?, offsets::MESSAGE_TYPE)
    }

    pub fn set_message_type(&mut self, message_type: i32) -> Result<()> {
        self.update_header(offsets::MESSAGE_TYPE, INT_SIZE_IN_BYTES, |buf| {
            fixed::encode_int(buf, offsets::MESSAGE_TYPE, message_type)
        })
    }

    pub fn correlation_id(&self) -> Result<i64> {
        fixed::decode_long(self.header_content()?, offsets::CORRELATION_ID)
    }

    /// Overwrite the correlation id.
    ///
    /// The header content is copied before it is written, so frames shared
    /// with a message that is still being sent are left untouched.
    pub fn set_correlation_id(&mut self, correlation_id: i64) -> Result<()> {
        self.update_header(offsets::CORRELATION_ID, LONG_SIZE_IN_BYTES, |buf| {
            fixed::encode_long(buf, offsets::CORRELATION_ID, correlation_id)
        })
    }

    /// Partition id of a request or event. Meaningless for responses.
    pub fn partition_id(&self) -> Result<i32> {
        fixed::decode_int(self.header_content()?, offsets::PARTITION_ID)
    }

    pub fn set_partition_id(&mut self, partition_id: i32) -> Result<()> {
        self.update_header(offsets::PARTITION_ID, INT_SIZE_IN_BYTES, |buf| {
            fixed::encode_int(buf, offsets::PARTITION_ID, partition_id)
        })
    }

    /// Backup-ack count of a response. Meaningless for requests and events.
    pub fn number_of_backup_acks(&self) -> Result<u8> {
        fixed::decode_byte(self.header_content()?, offsets::RESPONSE_BACKUP_ACKS)
    }

    /// Fragmentation id, read from the first frame of a fragment.
    pub fn fragmentation_id(&self) -> Result<i64> {
        fixed::decode_long(self.header_content()?, offsets::FRAGMENTATION_ID)
    }

    /// Decode the header frame the way `direction` defines it.
    pub fn header(&self, direction: Direction) -> Result<MessageHeader> {
        let content = self.header_content()?;
        let message_type = fixed::decode_int(content, offsets::MESSAGE_TYPE)?;
        let correlation_id = fixed::decode_long(content, offsets::CORRELATION_ID)?;

        Ok(match direction {
            Direction::Request => MessageHeader::Request {
                message_type,
                correlation_id,
                partition_id: fixed::decode_int(content, offsets::PARTITION_ID)?,
            },
            Direction::Event => MessageHeader::Event {
                message_type,
                correlation_id,
                partition_id: fixed::decode_int(content, offsets::PARTITION_ID)?,
            },
            Direction::Response => MessageHeader::Response {
                message_type,
                correlation_id,
                backup_acks: fixed::decode_byte(content, offsets::RESPONSE_BACKUP_ACKS)?,
            },
        })
    }

    /// Check if the header frame marks this message as a server event.
    pub fn is_event(&self) -> bool {
        self.start_frame().is_some_and(Frame::has_event_flag)
    }

    /// Check if the header frame marks this message as a backup-ack event.
    pub fn is_backup_event(&self) -> bool {
        self.start_frame().is_some_and(Frame::has_backup_event_flag)
    }

    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    #[inline]
    pub fn set_retryable(&mut self, retryable: bool) {
        self.retryable = retryable;
    }

    /// Human-readable operation label used in logs (never serialized).
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn set_operation_name(&mut self, name: impl Into<String>) {
        self.operation_name = Some(name.into());
    }

    /// Append the frames of another fragment to this message.
    ///
    /// The fragment's fragmentation frame must already be dropped.
    pub fn merge(&mut self, fragment: ClientMessage) {
        self.total_length += fragment.total_length;
        self.frames.extend(fragment.frames);
    }

    /// Remove the leading fragmentation frame and return it.
    pub fn drop_fragmentation_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.total_length -= frame.wire_length();
        self.cursor = self.cursor.saturating_sub(1);
        Some(frame)
    }

    /// Copy this message for re-sending under a fresh correlation id.
    ///
    /// The header frame is deep copied and its correlation id set to -1;
    /// every other frame shares its content with the original.
    pub fn copy_with_new_correlation_id(&self) -> Result<Self> {
        let mut frames = self.frames.clone();
        if let Some(header) = frames.front_mut() {
            *header = header.deep_copy();
        }

        let mut copy = Self {
            frames,
            cursor: 0,
            total_length: self.total_length,
            retryable: self.retryable,
            operation_name: self.operation_name.clone(),
        };
        copy.set_correlation_id(-1)?;
        Ok(copy)
    }

    fn header_content(&self) -> Result<&[u8]> {
        self.start_frame()
            .map(Frame::content)
            .ok_or_else(|| GridwireError::codec("message has no header frame"))
    }

    fn update_header<F>(&mut self, offset: usize, width: usize, write: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]),
    {
        let header = self
            .frames
            .front_mut()
            .ok_or_else(|| GridwireError::codec("message has no header frame"))?;
        if header.content.len() < offset + width {
            return Err(GridwireError::codec(format!(
                "header frame of {} bytes has no field at offset {}",
                header.content.len(),
                offset
            )));
        }
        header.update_content(write);
        Ok(())
    }
}

/// Messages are equal when their frame chains have equal content and flags.
impl PartialEq for ClientMessage {
    fn eq(&self, other: &Self) -> bool {
        self.frames == other.frames
    }
}

impl Eq for ClientMessage {}

/// Size of a header frame that also holds `extra` bytes of fixed-size fields.
pub const fn request_header_size(extra: usize) -> usize {
    offsets::REQUEST_HEADER_SIZE + extra
}

/// Size of a response header frame that also holds `extra` bytes.
pub const fn response_header_size(extra: usize) -> usize {
    offsets::RESPONSE_BACKUP_ACKS + BYTE_SIZE_IN_BYTES + extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;
    use crate::protocol::wire_format::SIZE_OF_FRAME_LENGTH_AND_FLAGS;
    use bytes::Bytes;

    fn request(message_type: i32, correlation_id: i64, partition_id: i32) -> ClientMessage {
        let mut message = ClientMessage::for_encode();
        message.add_frame(Frame::initial(offsets::REQUEST_HEADER_SIZE));
        message.set_message_type(message_type).unwrap();
        message.set_correlation_id(correlation_id).unwrap();
        message.set_partition_id(partition_id).unwrap();
        message
    }

    #[test]
    fn test_empty_message_has_no_frames() {
        let message = ClientMessage::for_encode();
        assert!(message.start_frame().is_none());
        assert!(message.end_frame().is_none());
        assert!(!message.has_next_frame());
        assert_eq!(message.total_length(), 0);
        assert!(message.message_type().is_err());
    }

    #[test]
    fn test_add_frame_updates_end_and_length() {
        let mut message = request(1, 2, 3);
        let header_len = message.total_length();
        message.add_frame(Frame::from_slice(b"abc", 0));

        assert_eq!(message.end_frame().unwrap().content(), b"abc");
        assert_eq!(
            message.total_length(),
            header_len + SIZE_OF_FRAME_LENGTH_AND_FLAGS + 3
        );
        assert_eq!(message.frame_count(), 2);
    }

    #[test]
    fn test_total_length_is_sum_of_frames() {
        let mut message = request(1, 2, 3);
        message.add_frame(Frame::begin());
        message.add_frame(Frame::from_slice(&[1; 100], 0));
        message.add_frame(Frame::end());

        let expected: usize = message.frames().map(|f| 6 + f.content.len()).sum();
        assert_eq!(message.total_length(), expected);
    }

    #[test]
    fn test_header_fields() {
        let message = request(0x0001_0200, 0x1122_3344_5566_7788, 271);

        assert_eq!(message.message_type().unwrap(), 0x0001_0200);
        assert_eq!(message.correlation_id().unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(message.partition_id().unwrap(), 271);
    }

    #[test]
    fn test_header_by_direction() {
        let mut response = ClientMessage::for_encode();
        let mut header = Frame::initial(offsets::RESPONSE_HEADER_SIZE);
        header.update_content(|buf| {
            fixed::encode_int(buf, offsets::MESSAGE_TYPE, 0x0101);
            fixed::encode_long(buf, offsets::CORRELATION_ID, 99);
            fixed::encode_byte(buf, offsets::RESPONSE_BACKUP_ACKS, 2);
        });
        response.add_frame(header);

        assert_eq!(
            response.header(Direction::Response).unwrap(),
            MessageHeader::Response {
                message_type: 0x0101,
                correlation_id: 99,
                backup_acks: 2,
            }
        );
        // A 13-byte response header has no room for a partition id
        assert!(response.header(Direction::Request).is_err());

        let request = request(5, 6, 7);
        let header = request.header(Direction::Request).unwrap();
        assert_eq!(header.message_type(), 5);
        assert_eq!(header.correlation_id(), 6);
        assert!(matches!(header, MessageHeader::Request { partition_id: 7, .. }));
    }

    #[test]
    fn test_cursor_navigation() {
        let mut message = request(1, 1, 1);
        message.add_frame(Frame::from_slice(b"a", 0));
        message.add_frame(Frame::from_slice(b"b", 0));

        assert!(message.next_frame().is_some()); // header
        assert_eq!(message.peek_next_frame().unwrap().content(), b"a");
        assert_eq!(message.next_frame().unwrap().content(), b"a");
        assert_eq!(message.next_frame().unwrap().content(), b"b");
        assert!(!message.has_next_frame());
        assert!(message.next_frame().is_none());

        message.reset_cursor();
        assert!(message.has_next_frame());
        assert_eq!(message.peek_next_frame().unwrap().content().len(), 16);
    }

    #[test]
    fn test_setter_on_short_header_fails() {
        let mut message = ClientMessage::for_encode();
        message.add_frame(Frame::initial(4));

        assert!(message.set_message_type(1).is_ok());
        assert!(message.set_correlation_id(1).is_err());
    }

    #[test]
    fn test_drop_fragmentation_frame_and_merge() {
        let mut first = ClientMessage::for_decode(vec![
            Frame::from_slice(&7i64.to_le_bytes(), flags::BEGIN_FRAGMENT),
            Frame::from_slice(b"header", 0),
        ]);
        let mut second = ClientMessage::for_decode(vec![
            Frame::from_slice(&7i64.to_le_bytes(), flags::END_FRAGMENT),
            Frame::from_slice(b"tail", 0),
        ]);

        assert_eq!(first.fragmentation_id().unwrap(), 7);
        let dropped = first.drop_fragmentation_frame().unwrap();
        assert!(dropped.has_begin_fragment_flag());
        second.drop_fragmentation_frame();

        first.merge(second);

        let contents: Vec<&[u8]> = first.frames().map(Frame::content).collect();
        assert_eq!(contents, vec![&b"header"[..], &b"tail"[..]]);
        assert_eq!(first.total_length(), 6 + 6 + 6 + 4);
        assert_eq!(first.next_frame().unwrap().content(), b"header");
    }

    #[test]
    fn test_copy_with_new_correlation_id() {
        let mut original = request(10, 1234, 5);
        original.set_retryable(true);
        original.set_operation_name("Map.Put");
        original.add_frame(Frame::new(Bytes::from_static(b"argument"), 0));

        let copy = original.copy_with_new_correlation_id().unwrap();

        assert_eq!(copy.correlation_id().unwrap(), -1);
        assert_eq!(original.correlation_id().unwrap(), 1234);
        assert_eq!(copy.message_type().unwrap(), 10);
        assert!(copy.is_retryable());
        assert_eq!(copy.operation_name(), Some("Map.Put"));

        // Argument frames are shared, the header is not
        let original_frames: Vec<&Frame> = original.frames().collect();
        let copy_frames: Vec<&Frame> = copy.frames().collect();
        assert_ne!(
            original_frames[0].content.as_ptr(),
            copy_frames[0].content.as_ptr()
        );
        assert_eq!(
            original_frames[1].content.as_ptr(),
            copy_frames[1].content.as_ptr()
        );
    }

    #[test]
    fn test_event_flags() {
        let message = ClientMessage::for_decode(vec![Frame::initial_with_flags(
            offsets::REQUEST_HEADER_SIZE,
            flags::UNFRAGMENTED_MESSAGE | flags::IS_EVENT,
        )]);
        assert!(message.is_event());
        assert!(!message.is_backup_event());
    }

    #[test]
    fn test_equality_ignores_cursor() {
        let mut a = request(1, 2, 3);
        let b = request(1, 2, 3);
        a.next_frame();
        assert_eq!(a, b);
    }

    #[test]
    fn test_header_size_helpers() {
        assert_eq!(request_header_size(8), 24);
        assert_eq!(response_header_size(0), 13);
    }
}
