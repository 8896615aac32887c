//! Fixed-width scalars at an offset inside an existing frame.
//!
//! Fixed-size fields never get a frame of their own. Per-operation codecs
//! size the header frame to hold them and write each at a known offset:
//! ```text
//! header frame of a request carrying one i64 argument
//! ┌──────────┬────────────────┬──────────────┬──────────────┐
//! │ type i32 │ correlation i64│ partition i32│ argument i64 │
//! │ @0       │ @4             │ @12          │ @16          │
//! └──────────┴────────────────┴──────────────┴──────────────┘
//! ```
//!
//! Encoders write into a buffer the caller has already sized and panic if it
//! is too short. Decoders read untrusted input and return a codec error.
//!
//! A UUID takes 17 bytes: a null marker, then the most and least
//! significant halves as `i64`.

use uuid::Uuid;

use crate::error::{GridwireError, Result};
use crate::protocol::{BOOLEAN_SIZE_IN_BYTES, LONG_SIZE_IN_BYTES};

#[inline]
fn read<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    offset
        .checked_add(N)
        .and_then(|end| buf.get(offset..end))
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            GridwireError::codec(format!(
                "cannot read {} bytes at offset {} from a {} byte frame",
                N,
                offset,
                buf.len()
            ))
        })
}

/// # Panics
///
/// Panics if `buf` has no byte at `offset`.
#[inline]
pub fn encode_byte(buf: &mut [u8], offset: usize, value: u8) {
    buf[offset] = value;
}

#[inline]
pub fn decode_byte(buf: &[u8], offset: usize) -> Result<u8> {
    read::<1>(buf, offset).map(|[b]| b)
}

#[inline]
pub fn encode_boolean(buf: &mut [u8], offset: usize, value: bool) {
    encode_byte(buf, offset, value as u8);
}

/// Any non-zero byte decodes as `true`.
#[inline]
pub fn decode_boolean(buf: &[u8], offset: usize) -> Result<bool> {
    decode_byte(buf, offset).map(|b| b != 0)
}

#[inline]
pub fn encode_short(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn decode_short(buf: &[u8], offset: usize) -> Result<i16> {
    read(buf, offset).map(i16::from_le_bytes)
}

/// # Panics
///
/// Panics if `buf` is shorter than `offset + 4`.
#[inline]
pub fn encode_int(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn decode_int(buf: &[u8], offset: usize) -> Result<i32> {
    read(buf, offset).map(i32::from_le_bytes)
}

/// # Panics
///
/// Panics if `buf` is shorter than `offset + 8`.
#[inline]
pub fn encode_long(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn decode_long(buf: &[u8], offset: usize) -> Result<i64> {
    read(buf, offset).map(i64::from_le_bytes)
}

#[inline]
pub fn encode_double(buf: &mut [u8], offset: usize, value: f64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn decode_double(buf: &[u8], offset: usize) -> Result<f64> {
    read(buf, offset).map(f64::from_le_bytes)
}

/// Encode an optional UUID. `None` sets the null marker and leaves the
/// remaining 16 bytes untouched.
///
/// # Panics
///
/// Panics if `buf` is shorter than `offset + 17`.
pub fn encode_uuid(buf: &mut [u8], offset: usize, value: Option<Uuid>) {
    encode_boolean(buf, offset, value.is_none());
    if let Some(uuid) = value {
        let (most, least) = uuid.as_u64_pair();
        let most_offset = offset + BOOLEAN_SIZE_IN_BYTES;
        encode_long(buf, most_offset, most as i64);
        encode_long(buf, most_offset + LONG_SIZE_IN_BYTES, least as i64);
    }
}

pub fn decode_uuid(buf: &[u8], offset: usize) -> Result<Option<Uuid>> {
    if decode_boolean(buf, offset)? {
        return Ok(None);
    }
    let most_offset = offset + BOOLEAN_SIZE_IN_BYTES;
    let most = decode_long(buf, most_offset)?;
    let least = decode_long(buf, most_offset + LONG_SIZE_IN_BYTES)?;
    Ok(Some(Uuid::from_u64_pair(most as u64, least as u64)))
}
