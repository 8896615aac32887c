//! Codec module - builtin primitives used by per-operation codecs.
//!
//! Every request and response codec is assembled from these pieces:
//!
//! - [`fixed`] - fixed-width scalars written at an offset inside the header frame
//! - [`StringCodec`] / [`ByteArrayCodec`] - one frame per value
//! - [`ListMultiFrameCodec`] / [`EntryListCodec`] - `BEGIN`/`END` delimited structures
//! - [`ListIntegerCodec`] / [`ListLongCodec`] / [`ListUuidCodec`] - packed fixed-size lists
//! - [`util`] - nullable values and structure navigation
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! Item codecs are passed as plain functions, so lists of lists compose
//! without boxing.
//!
//! Encoding cannot fail. Decoding consumes frames from the message cursor
//! and returns [`GridwireError::Codec`](crate::GridwireError::Codec) when
//! the frames do not match.
//!
//! # Example
//!
//! ```
//! use gridwire_client::codec::{fixed, ListMultiFrameCodec, StringCodec};
//! use gridwire_client::protocol::{offsets, request_header_size, ClientMessage, Frame};
//!
//! // An operation with one i64 argument, a name and a list of strings
//! const DELTA_OFFSET: usize = offsets::REQUEST_HEADER_SIZE;
//!
//! let mut message = ClientMessage::for_encode();
//! let mut header = Frame::initial(request_header_size(8));
//! header.update_content(|buf| {
//!     fixed::encode_int(buf, offsets::MESSAGE_TYPE, 0x090600);
//!     fixed::encode_long(buf, DELTA_OFFSET, 5);
//! });
//! message.add_frame(header);
//! StringCodec::encode(&mut message, "counter");
//! ListMultiFrameCodec::encode(&mut message, ["a", "b"], StringCodec::encode);
//!
//! let header = message.next_frame().unwrap();
//! assert_eq!(fixed::decode_long(header.content(), DELTA_OFFSET).unwrap(), 5);
//! assert_eq!(StringCodec::decode(&mut message).unwrap(), "counter");
//! let items = ListMultiFrameCodec::decode(&mut message, StringCodec::decode).unwrap();
//! assert_eq!(items, ["a", "b"]);
//! ```

pub mod fixed;
mod list;
mod string;
pub mod util;

pub use list::{EntryListCodec, ListIntegerCodec, ListLongCodec, ListMultiFrameCodec, ListUuidCodec};
pub use string::{ByteArrayCodec, StringCodec};
