//! Homogeneous lists and entry lists.
//!
//! Lists of variable-size items are a data structure:
//! ```text
//! [BEGIN] [item] [item] ... [END]
//! ```
//! An item may itself span several frames (a nested structure) or be a
//! `NULL` frame. Lists of fixed-size items are packed into a single frame
//! instead: `n` items of width `w` give one frame of `n * w` bytes.
//!
//! Entry lists (maps) interleave keys and values inside one structure:
//! `[BEGIN] [k1] [v1] [k2] [v2] ... [END]`.

use uuid::Uuid;

use super::fixed;
use super::util::{expect_begin_frame, next_frame_is_data_structure_end_frame, next_frame_is_null_frame, required_frame};
use crate::error::{GridwireError, Result};
use crate::protocol::{
    flags, ClientMessage, Frame, INT_SIZE_IN_BYTES, LONG_SIZE_IN_BYTES, UUID_SIZE_IN_BYTES,
};

/// Lists whose items take one or more frames each.
pub struct ListMultiFrameCodec;

impl ListMultiFrameCodec {
    pub fn encode<I, T, F>(message: &mut ClientMessage, items: I, mut encode_item: F)
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&mut ClientMessage, T),
    {
        message.add_frame(Frame::begin());
        for item in items {
            encode_item(message, item);
        }
        message.add_frame(Frame::end());
    }

    /// Encode a list whose items may be absent. Absent items become `NULL`
    /// frames.
    pub fn encode_contains_nullable<I, T, F>(
        message: &mut ClientMessage,
        items: I,
        mut encode_item: F,
    ) where
        I: IntoIterator<Item = Option<T>>,
        F: FnMut(&mut ClientMessage, T),
    {
        message.add_frame(Frame::begin());
        for item in items {
            match item {
                Some(item) => encode_item(message, item),
                None => message.add_frame(Frame::null()),
            }
        }
        message.add_frame(Frame::end());
    }

    /// Encode a list that may itself be absent.
    pub fn encode_nullable<I, T, F>(message: &mut ClientMessage, items: Option<I>, encode_item: F)
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&mut ClientMessage, T),
    {
        match items {
            Some(items) => Self::encode(message, items, encode_item),
            None => message.add_frame(Frame::null()),
        }
    }

    pub fn decode<T, F>(message: &mut ClientMessage, mut decode_item: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut ClientMessage) -> Result<T>,
    {
        expect_begin_frame(message)?;
        let mut items = Vec::new();
        while !next_frame_is_data_structure_end_frame(message) {
            items.push(decode_item(message)?);
        }
        // END
        required_frame(message)?;
        Ok(items)
    }

    pub fn decode_contains_nullable<T, F>(
        message: &mut ClientMessage,
        mut decode_item: F,
    ) -> Result<Vec<Option<T>>>
    where
        F: FnMut(&mut ClientMessage) -> Result<T>,
    {
        expect_begin_frame(message)?;
        let mut items = Vec::new();
        while !next_frame_is_data_structure_end_frame(message) {
            if next_frame_is_null_frame(message) {
                items.push(None);
            } else {
                items.push(Some(decode_item(message)?));
            }
        }
        required_frame(message)?;
        Ok(items)
    }

    pub fn decode_nullable<T, F>(message: &mut ClientMessage, decode_item: F) -> Result<Option<Vec<T>>>
    where
        F: FnMut(&mut ClientMessage) -> Result<T>,
    {
        if next_frame_is_null_frame(message) {
            Ok(None)
        } else {
            Self::decode(message, decode_item).map(Some)
        }
    }
}

/// Pack `items` into one frame, `width` bytes apiece.
fn encode_fixed<T: Copy>(
    message: &mut ClientMessage,
    items: &[T],
    width: usize,
    encode_item: fn(&mut [u8], usize, T),
) {
    let mut frame = Frame::initial_with_flags(items.len() * width, flags::DEFAULT_FLAGS);
    frame.update_content(|buf| {
        for (i, item) in items.iter().enumerate() {
            encode_item(buf, i * width, *item);
        }
    });
    message.add_frame(frame);
}

fn decode_fixed<T>(
    message: &mut ClientMessage,
    width: usize,
    decode_item: fn(&[u8], usize) -> Result<T>,
) -> Result<Vec<T>> {
    let frame = required_frame(message)?;
    let content = frame.content();
    if content.len() % width != 0 {
        return Err(GridwireError::codec(format!(
            "list frame of {} bytes is not a multiple of the item size {}",
            content.len(),
            width
        )));
    }
    (0..content.len() / width)
        .map(|i| decode_item(content, i * width))
        .collect()
}

/// `i32` lists packed into one frame.
pub struct ListIntegerCodec;

impl ListIntegerCodec {
    pub fn encode(message: &mut ClientMessage, items: &[i32]) {
        encode_fixed(message, items, INT_SIZE_IN_BYTES, fixed::encode_int);
    }

    pub fn decode(message: &mut ClientMessage) -> Result<Vec<i32>> {
        decode_fixed(message, INT_SIZE_IN_BYTES, fixed::decode_int)
    }
}

/// `i64` lists packed into one frame.
pub struct ListLongCodec;

impl ListLongCodec {
    pub fn encode(message: &mut ClientMessage, items: &[i64]) {
        encode_fixed(message, items, LONG_SIZE_IN_BYTES, fixed::encode_long);
    }

    pub fn decode(message: &mut ClientMessage) -> Result<Vec<i64>> {
        decode_fixed(message, LONG_SIZE_IN_BYTES, fixed::decode_long)
    }
}

/// UUID lists packed into one frame, 17 bytes per item.
pub struct ListUuidCodec;

impl ListUuidCodec {
    pub fn encode(message: &mut ClientMessage, items: &[Option<Uuid>]) {
        encode_fixed(message, items, UUID_SIZE_IN_BYTES, fixed::encode_uuid);
    }

    pub fn decode(message: &mut ClientMessage) -> Result<Vec<Option<Uuid>>> {
        decode_fixed(message, UUID_SIZE_IN_BYTES, fixed::decode_uuid)
    }
}

/// Key/value pairs inside one data structure.
pub struct EntryListCodec;

impl EntryListCodec {
    pub fn encode<I, K, V, FK, FV>(
        message: &mut ClientMessage,
        entries: I,
        mut encode_key: FK,
        mut encode_value: FV,
    ) where
        I: IntoIterator<Item = (K, V)>,
        FK: FnMut(&mut ClientMessage, K),
        FV: FnMut(&mut ClientMessage, V),
    {
        message.add_frame(Frame::begin());
        for (key, value) in entries {
            encode_key(message, key);
            encode_value(message, value);
        }
        message.add_frame(Frame::end());
    }

    pub fn encode_nullable<I, K, V, FK, FV>(
        message: &mut ClientMessage,
        entries: Option<I>,
        encode_key: FK,
        encode_value: FV,
    ) where
        I: IntoIterator<Item = (K, V)>,
        FK: FnMut(&mut ClientMessage, K),
        FV: FnMut(&mut ClientMessage, V),
    {
        match entries {
            Some(entries) => Self::encode(message, entries, encode_key, encode_value),
            None => message.add_frame(Frame::null()),
        }
    }

    pub fn decode<K, V, FK, FV>(
        message: &mut ClientMessage,
        mut decode_key: FK,
        mut decode_value: FV,
    ) -> Result<Vec<(K, V)>>
    where
        FK: FnMut(&mut ClientMessage) -> Result<K>,
        FV: FnMut(&mut ClientMessage) -> Result<V>,
    {
        expect_begin_frame(message)?;
        let mut entries = Vec::new();
        while !next_frame_is_data_structure_end_frame(message) {
            let key = decode_key(message)?;
            let value = decode_value(message)?;
            entries.push((key, value));
        }
        required_frame(message)?;
        Ok(entries)
    }

    pub fn decode_nullable<K, V, FK, FV>(
        message: &mut ClientMessage,
        decode_key: FK,
        decode_value: FV,
    ) -> Result<Option<Vec<(K, V)>>>
    where
        FK: FnMut(&mut ClientMessage) -> Result<K>,
        FV: FnMut(&mut ClientMessage) -> Result<V>,
    {
        if next_frame_is_null_frame(message) {
            Ok(None)
        } else {
            Self::decode(message, decode_key, decode_value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ByteArrayCodec, StringCodec};
    use bytes::Bytes;

    fn rewind(message: ClientMessage) -> ClientMessage {
        ClientMessage::for_decode(message.frames().cloned())
    }

    #[test]
    fn test_string_list_layout() {
        let mut message = ClientMessage::for_encode();
        ListMultiFrameCodec::encode(&mut message, ["a", "bc"], StringCodec::encode);

        let frames: Vec<&Frame> = message.frames().collect();
        assert_eq!(frames.len(), 4);
        assert!(frames[0].is_begin_frame());
        assert_eq!(frames[1].content(), b"a");
        assert_eq!(frames[2].content(), b"bc");
        assert!(frames[3].is_end_frame());

        let mut message = rewind(message);
        let decoded = ListMultiFrameCodec::decode(&mut message, StringCodec::decode).unwrap();
        assert_eq!(decoded, vec!["a".to_string(), "bc".to_string()]);
        assert!(!message.has_next_frame());
    }

    #[test]
    fn test_empty_list() {
        let mut message = ClientMessage::for_encode();
        ListMultiFrameCodec::encode(&mut message, Vec::<&str>::new(), StringCodec::encode);
        assert_eq!(message.frame_count(), 2);

        let mut message = rewind(message);
        let decoded = ListMultiFrameCodec::decode(&mut message, StringCodec::decode).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_nested_lists() {
        let outer = vec![vec!["x"], vec![], vec!["y", "z"]];
        let mut message = ClientMessage::for_encode();
        ListMultiFrameCodec::encode(&mut message, outer, |m, inner| {
            ListMultiFrameCodec::encode(m, inner, StringCodec::encode)
        });

        let mut message = rewind(message);
        let decoded = ListMultiFrameCodec::decode(&mut message, |m| {
            ListMultiFrameCodec::decode(m, StringCodec::decode)
        })
        .unwrap();

        assert_eq!(decoded.len(), 3);
        assert!(decoded[1].is_empty());
        assert_eq!(decoded[2], vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_list_with_null_items() {
        let mut message = ClientMessage::for_encode();
        ListMultiFrameCodec::encode_contains_nullable(
            &mut message,
            [Some("a"), None, Some("c")],
            StringCodec::encode,
        );

        let mut message = rewind(message);
        let decoded =
            ListMultiFrameCodec::decode_contains_nullable(&mut message, StringCodec::decode)
                .unwrap();
        assert_eq!(decoded, vec![Some("a".to_string()), None, Some("c".to_string())]);
    }

    #[test]
    fn test_nullable_list() {
        let mut message = ClientMessage::for_encode();
        ListMultiFrameCodec::encode_nullable(&mut message, None::<Vec<&str>>, StringCodec::encode);
        ListMultiFrameCodec::encode_nullable(&mut message, Some(["q"]), StringCodec::encode);

        let mut message = rewind(message);
        assert_eq!(
            ListMultiFrameCodec::decode_nullable(&mut message, StringCodec::decode).unwrap(),
            None
        );
        assert_eq!(
            ListMultiFrameCodec::decode_nullable(&mut message, StringCodec::decode).unwrap(),
            Some(vec!["q".to_string()])
        );
    }

    #[test]
    fn test_list_missing_begin_is_error() {
        let mut message = ClientMessage::for_decode(vec![Frame::from_slice(b"a", 0), Frame::end()]);
        assert!(ListMultiFrameCodec::decode(&mut message, StringCodec::decode).is_err());
    }

    #[test]
    fn test_list_missing_end_is_error() {
        let mut message = ClientMessage::for_decode(vec![Frame::begin(), Frame::from_slice(b"a", 0)]);
        assert!(ListMultiFrameCodec::decode(&mut message, StringCodec::decode).is_err());
    }

    #[test]
    fn test_integer_list_is_one_frame() {
        let mut message = ClientMessage::for_encode();
        ListIntegerCodec::encode(&mut message, &[1, -2, 3]);

        assert_eq!(message.frame_count(), 1);
        assert_eq!(message.end_frame().unwrap().content().len(), 12);

        let mut message = rewind(message);
        assert_eq!(ListIntegerCodec::decode(&mut message).unwrap(), vec![1, -2, 3]);
    }

    #[test]
    fn test_long_and_uuid_lists() {
        let uuid = Uuid::from_u64_pair(1, 2);
        let mut message = ClientMessage::for_encode();
        ListLongCodec::encode(&mut message, &[i64::MIN, 0, i64::MAX]);
        ListUuidCodec::encode(&mut message, &[Some(uuid), None]);

        let mut message = rewind(message);
        assert_eq!(
            ListLongCodec::decode(&mut message).unwrap(),
            vec![i64::MIN, 0, i64::MAX]
        );
        assert_eq!(ListUuidCodec::decode(&mut message).unwrap(), vec![Some(uuid), None]);
    }

    #[test]
    fn test_fixed_list_with_ragged_frame_is_error() {
        let mut message = ClientMessage::for_decode(vec![Frame::from_slice(&[0; 6], 0)]);
        assert!(ListIntegerCodec::decode(&mut message).is_err());
    }

    #[test]
    fn test_entry_list() {
        let entries = vec![("k1", Bytes::from_static(b"v1")), ("k2", Bytes::new())];
        let mut message = ClientMessage::for_encode();
        EntryListCodec::encode(
            &mut message,
            entries,
            StringCodec::encode,
            ByteArrayCodec::encode_bytes,
        );
        assert_eq!(message.frame_count(), 6);

        let mut message = rewind(message);
        let decoded =
            EntryListCodec::decode(&mut message, StringCodec::decode, ByteArrayCodec::decode)
                .unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].0, "k1");
        assert_eq!(&decoded[0].1[..], b"v1");
        assert!(decoded[1].1.is_empty());
    }

    #[test]
    fn test_nullable_entry_list() {
        let mut message = ClientMessage::for_encode();
        EntryListCodec::encode_nullable(
            &mut message,
            None::<Vec<(&str, &str)>>,
            StringCodec::encode,
            StringCodec::encode,
        );

        let mut message = rewind(message);
        let decoded = EntryListCodec::decode_nullable(
            &mut message,
            StringCodec::decode,
            StringCodec::decode,
        )
        .unwrap();
        assert!(decoded.is_none());
    }
}
