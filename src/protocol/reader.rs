//! Incremental message reader.
//!
//! Turns an arbitrarily chunked byte stream back into whole messages.
//! Uses `bytes::BytesMut` so that frame content is split off the receive
//! buffer without copying. Parsing is a two-state machine:
//! - `AwaitingHeader`: need 6 bytes for length and flags
//! - `AwaitingBody`: header parsed, need `frame_length - 6` content bytes
//!
//! Frames accumulate into the current message until one arrives with
//! `IS_FINAL` set. That flag is cleared from the stored frame.
//!
//! # Example
//!
//! ```
//! use gridwire_client::protocol::{ClientMessage, ClientMessageReader, Frame};
//!
//! let mut message = ClientMessage::for_encode();
//! message.add_frame(Frame::initial(16));
//! let bytes = message.to_bytes();
//!
//! let mut reader = ClientMessageReader::new();
//! reader.append(&bytes[..4]);
//! assert!(reader.read().unwrap().is_none());
//!
//! reader.append(&bytes[4..]);
//! assert_eq!(reader.read().unwrap(), Some(message));
//! ```

use std::mem;

use bytes::BytesMut;

use super::frame::Frame;
use super::message::ClientMessage;
use super::wire_format::{flags, FrameHeader, DEFAULT_MAX_FRAME_LENGTH, SIZE_OF_FRAME_LENGTH_AND_FLAGS};
use crate::error::{GridwireError, Result};

const DEFAULT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum State {
    AwaitingHeader,
    AwaitingBody { content_length: usize, flags: u16 },
}

/// Reassembles messages from a byte stream.
#[derive(Debug)]
pub struct ClientMessageReader {
    buffer: BytesMut,
    state: State,
    /// Frames of the message being assembled.
    current: ClientMessage,
    max_frame_length: u32,
}

impl ClientMessageReader {
    /// Create a reader with a 64KB buffer and the largest legal frame size.
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_frame_length(max_frame_length: u32) -> Self {
        Self::with_capacity_and_max_frame_length(DEFAULT_CAPACITY, max_frame_length)
    }

    pub fn with_capacity_and_max_frame_length(capacity: usize, max_frame_length: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::AwaitingHeader,
            current: ClientMessage::for_decode(Vec::new()),
            max_frame_length,
        }
    }

    /// Queue bytes received from the socket.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Receive buffer, for reading from a socket without an extra copy.
    ///
    /// Bytes must only be appended. The next [`read`](Self::read) picks them up.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Try to complete one message from the queued bytes.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Call again after
    /// [`append`](Self::append) until it does.
    ///
    /// # Errors
    ///
    /// Returns [`GridwireError::Protocol`] for a frame length below 6 or
    /// above the configured maximum, or for a frame that both begins and
    /// ends a data structure. The stream cannot be resynchronized after
    /// that.
    pub fn read(&mut self) -> Result<Option<ClientMessage>> {
        loop {
            match self.state {
                State::AwaitingHeader => {
                    let Some(header) = FrameHeader::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    let content_length = header.validate(self.max_frame_length)?;

                    let _ = self.buffer.split_to(SIZE_OF_FRAME_LENGTH_AND_FLAGS);
                    self.state = State::AwaitingBody {
                        content_length,
                        flags: header.flags,
                    };
                }

                State::AwaitingBody {
                    content_length,
                    flags: frame_flags,
                } => {
                    if self.buffer.len() < content_length {
                        return Ok(None);
                    }

                    let content = self.buffer.split_to(content_length).freeze();
                    self.state = State::AwaitingHeader;

                    if flags::has_flag(frame_flags, flags::BEGIN_DATA_STRUCTURE)
                        && flags::has_flag(frame_flags, flags::END_DATA_STRUCTURE)
                    {
                        return Err(GridwireError::Protocol(format!(
                            "Frame flags {:#06x} both begin and end a data structure",
                            frame_flags
                        )));
                    }

                    let is_final = flags::has_flag(frame_flags, flags::IS_FINAL);
                    self.current
                        .add_frame(Frame::new(content, frame_flags & !flags::IS_FINAL));

                    if is_final {
                        let message = mem::replace(
                            &mut self.current,
                            ClientMessage::for_decode(Vec::new()),
                        );
                        return Ok(Some(message));
                    }
                }
            }
        }
    }

    /// Append `data` and drain every message it completes.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<ClientMessage>> {
        self.append(data);

        let mut messages = Vec::new();
        while let Some(message) = self.read()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Number of received bytes not yet turned into frames.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no bytes or frames are held back.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
            && self.current.is_empty()
            && matches!(self.state, State::AwaitingHeader)
    }

    /// Drop all buffered bytes and any partially assembled message.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::AwaitingHeader;
        self.current = ClientMessage::for_decode(Vec::new());
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::AwaitingHeader => "AwaitingHeader",
            State::AwaitingBody { .. } => "AwaitingBody",
        }
    }
}

impl Default for ClientMessageReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame_header, offsets};
    use proptest::prelude::*;

    fn make_message(correlation_id: i64, payload: &[u8]) -> ClientMessage {
        let mut message = ClientMessage::for_encode();
        message.add_frame(Frame::initial(offsets::REQUEST_HEADER_SIZE));
        message.set_message_type(0x0001_0100).unwrap();
        message.set_correlation_id(correlation_id).unwrap();
        message.add_frame(Frame::from_slice(payload, flags::DEFAULT_FLAGS));
        message
    }

    #[test]
    fn test_single_complete_message() {
        let mut reader = ClientMessageReader::new();
        let message = make_message(42, b"hello");

        let messages = reader.push(&message.to_bytes()).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], message);
        assert_eq!(messages[0].correlation_id().unwrap(), 42);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_bytes_placed_in_receive_buffer_are_read() {
        let mut reader = ClientMessageReader::with_capacity_and_max_frame_length(16, DEFAULT_MAX_FRAME_LENGTH);
        let first = make_message(1, b"first");
        let second = make_message(2, b"second");
        let bytes = [first.to_bytes(), second.to_bytes()].concat();

        reader.buffer_mut().extend_from_slice(&bytes[..9]);
        assert!(reader.read().unwrap().is_none());

        reader.buffer_mut().extend_from_slice(&bytes[9..]);
        assert_eq!(reader.read().unwrap(), Some(first));
        assert_eq!(reader.read().unwrap(), Some(second));
        assert!(reader.read().unwrap().is_none());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_is_final_is_cleared_from_stored_frame() {
        let mut reader = ClientMessageReader::new();
        let message = make_message(1, b"x");

        let received = reader.push(&message.to_bytes()).unwrap().remove(0);

        assert!(received.frames().all(|frame| !frame.is_final_frame()));
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let mut reader = ClientMessageReader::new();
        let first = make_message(1, b"first");
        let second = make_message(2, b"second");
        let third = make_message(3, b"third");

        let mut combined = BytesMut::new();
        first.write_to(&mut combined);
        second.write_to(&mut combined);
        third.write_to(&mut combined);

        let messages = reader.push(&combined).unwrap();

        let ids: Vec<i64> = messages.iter().map(|m| m.correlation_id().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_header_split_across_chunks() {
        let mut reader = ClientMessageReader::new();
        let bytes = make_message(42, b"test").to_bytes();

        reader.append(&bytes[..3]);
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.state_name(), "AwaitingHeader");

        reader.append(&bytes[3..]);
        let message = reader.read().unwrap().unwrap();
        assert_eq!(message.correlation_id().unwrap(), 42);
    }

    #[test]
    fn test_body_split_across_chunks() {
        let mut reader = ClientMessageReader::new();
        let payload = vec![0x5A; 1000];
        let bytes = make_message(7, &payload).to_bytes();

        // Header frame complete, second frame header plus part of its body
        let split = 6 + 16 + 6 + 100;
        assert!(reader.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(reader.state_name(), "AwaitingBody");

        let messages = reader.push(&bytes[split..]).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].end_frame().unwrap().content(), &payload[..]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut reader = ClientMessageReader::new();
        let message = make_message(9, b"hi");

        let mut received = Vec::new();
        for byte in message.to_bytes().iter() {
            received.extend(reader.push(&[*byte]).unwrap());
        }

        assert_eq!(received, vec![message]);
    }

    #[test]
    fn test_leftover_bytes_stay_queued() {
        let mut reader = ClientMessageReader::new();
        let first = make_message(1, b"a").to_bytes();
        let second = make_message(2, b"b").to_bytes();

        let mut data = first.to_vec();
        data.extend_from_slice(&second[..10]);

        assert_eq!(reader.push(&data).unwrap().len(), 1);
        assert!(!reader.is_empty());

        let messages = reader.push(&second[10..]).unwrap();
        assert_eq!(messages[0].correlation_id().unwrap(), 2);
    }

    #[test]
    fn test_empty_content_frames() {
        let mut reader = ClientMessageReader::new();
        let mut message = ClientMessage::for_encode();
        message.add_frame(Frame::initial(offsets::REQUEST_HEADER_SIZE));
        message.add_frame(Frame::begin());
        message.add_frame(Frame::null());
        message.add_frame(Frame::end());

        let received = reader.push(&message.to_bytes()).unwrap();

        assert_eq!(received, vec![message]);
    }

    #[test]
    fn test_frame_length_below_header_is_error() {
        let mut reader = ClientMessageReader::new();
        let bad = [5u8, 0, 0, 0, 0, 0];

        let err = reader.push(&bad).unwrap_err();
        assert!(matches!(err, GridwireError::Protocol(_)));
    }

    #[test]
    fn test_max_frame_length() {
        let mut reader = ClientMessageReader::with_max_frame_length(100);
        let header = encode_frame_header(1000, flags::IS_FINAL);

        let err = reader.push(&header).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_begin_and_end_frame_is_error() {
        let mut reader = ClientMessageReader::new();
        let header = encode_frame_header(
            0,
            flags::BEGIN_DATA_STRUCTURE | flags::END_DATA_STRUCTURE | flags::IS_FINAL,
        );

        assert!(reader.push(&header).is_err());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut reader = ClientMessageReader::new();
        let bytes = make_message(1, b"abc").to_bytes();

        reader.push(&bytes[..30]).unwrap();
        assert!(!reader.is_empty());

        reader.clear();
        assert!(reader.is_empty());
        assert_eq!(reader.state_name(), "AwaitingHeader");

        assert_eq!(reader.push(&bytes).unwrap().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_matter(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
        ) {
            let messages: Vec<ClientMessage> = payloads
                .iter()
                .enumerate()
                .map(|(i, payload)| make_message(i as i64, payload))
                .collect();

            let mut stream = BytesMut::new();
            for message in &messages {
                message.write_to(&mut stream);
            }

            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(stream.len() + 1)).collect();
            points.push(0);
            points.push(stream.len());
            points.sort_unstable();
            points.dedup();

            let mut reader = ClientMessageReader::new();
            let mut received = Vec::new();
            for window in points.windows(2) {
                received.extend(reader.push(&stream[window[0]..window[1]]).unwrap());
            }

            prop_assert_eq!(received, messages);
            prop_assert!(reader.is_empty());
        }
    }
}
