//! Helpers shared by the builtin codecs: nullable values and structure
//! navigation.

use crate::error::{GridwireError, Result};
use crate::protocol::{ClientMessage, Frame};

/// Consume the next frame, failing if the message has run out.
pub(crate) fn required_frame(message: &mut ClientMessage) -> Result<Frame> {
    message
        .next_frame()
        .cloned()
        .ok_or_else(|| GridwireError::codec("unexpected end of message"))
}

/// Consume the `BEGIN` frame that opens a data structure.
pub(crate) fn expect_begin_frame(message: &mut ClientMessage) -> Result<()> {
    let frame = required_frame(message)?;
    if !frame.is_begin_frame() {
        return Err(GridwireError::codec(format!(
            "expected a begin frame, found flags {:#06x}",
            frame.flags
        )));
    }
    Ok(())
}

/// Write `value` with `encode`, or the `NULL` sentinel if it is absent.
pub fn encode_nullable<T, F>(message: &mut ClientMessage, value: Option<T>, encode: F)
where
    F: FnOnce(&mut ClientMessage, T),
{
    match value {
        Some(value) => encode(message, value),
        None => message.add_frame(Frame::null()),
    }
}

/// Read a value written by [`encode_nullable`].
pub fn decode_nullable<T, F>(message: &mut ClientMessage, decode: F) -> Result<Option<T>>
where
    F: FnOnce(&mut ClientMessage) -> Result<T>,
{
    if next_frame_is_null_frame(message) {
        Ok(None)
    } else {
        decode(message).map(Some)
    }
}

/// Check if the next frame is a `NULL` sentinel, consuming it if so.
pub fn next_frame_is_null_frame(message: &mut ClientMessage) -> bool {
    let is_null = message.peek_next_frame().is_some_and(Frame::is_null_frame);
    if is_null {
        message.next_frame();
    }
    is_null
}

/// Check if the next frame closes a data structure. Does not consume it.
pub fn next_frame_is_data_structure_end_frame(message: &ClientMessage) -> bool {
    message.peek_next_frame().is_some_and(Frame::is_end_frame)
}

/// Skip the rest of the current data structure, including its `END` frame.
///
/// Nested structures are skipped whole. Used to ignore fields added by
/// newer servers.
pub fn fast_forward_to_end_frame(message: &mut ClientMessage) -> Result<()> {
    let mut expected_end_frames = 1usize;
    while expected_end_frames != 0 {
        let frame = message
            .next_frame()
            .ok_or_else(|| GridwireError::codec("data structure has no end frame"))?;
        if frame.is_end_frame() {
            expected_end_frames -= 1;
        } else if frame.is_begin_frame() {
            expected_end_frames += 1;
        }
    }
    Ok(())
}
