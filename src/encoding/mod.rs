//! Byte-level primitives shared by the block encoder and decoder.
//!
//! Everything here is a free-standing pure function: encoders append to a
//! caller-owned `Vec<u8>`, decoders read from the front of a slice and
//! return `(value, bytes_consumed)` so callers can advance a cursor.
//!
//! # Wire format
//!
//! | Primitive   | Encoding                                                  |
//! |-------------|-----------------------------------------------------------|
//! | `varint32`  | 1–5 bytes, 7 data bits per byte, high bit = "more"        |
//! | `varint64`  | 1–10 bytes, same scheme                                   |
//! | `fixed32`   | 4 bytes, little-endian                                    |
//!
//! Varint groups are emitted least-significant first, so `300` encodes as
//! `[0xAC, 0x02]`.
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or unchecked
//! indexing. Every malformed input is reported through [`EncodingError`].


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Maximum encoded size of a 32-bit varint.
pub const MAX_VARINT32_LEN: usize = 5;

/// Maximum encoded size of a 64-bit varint.
pub const MAX_VARINT64_LEN: usize = 10;

/// Size of a fixed 32-bit little-endian integer.
pub const FIXED32_LEN: usize = 4;

const CONTINUATION_BIT: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A varint did not terminate within its width, or its last byte
    /// carried bits beyond the target width.
    #[error("varint overflows {bits} bits")]
    VarintOverflow {
        /// Width of the integer being decoded.
        bits: u32,
    },

    /// A length does not fit the on-disk field that must hold it.
    #[error("length overflow: {0}")]
    LengthOverflow(String),
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes, returning
/// [`EncodingError::UnexpectedEof`] if not.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Convert a `usize` length to `u32`, returning [`EncodingError::LengthOverflow`]
/// if the value exceeds `u32::MAX`.
#[inline]
pub fn len_to_u32(len: usize) -> Result<u32, EncodingError> {
    u32::try_from(len)
        .map_err(|_| EncodingError::LengthOverflow(format!("length {len} exceeds u32::MAX")))
}

/// Shared varint decoder for widths up to 64 bits.
fn decode_varint(buf: &[u8], bits: u32, max_len: usize) -> Result<(u64, usize), EncodingError> {
    let mut result: u64 = 0;
    for (i, &byte) in buf.iter().take(max_len).enumerate() {
        let shift = 7 * i as u32;
        let payload = u64::from(byte & PAYLOAD_MASK);

        // Bits that would land above `bits` make the encoding invalid.
        if shift + 7 > bits && (payload >> (bits - shift)) != 0 {
            return Err(EncodingError::VarintOverflow { bits });
        }

        result |= payload << shift;
        if byte & CONTINUATION_BIT == 0 {
            return Ok((result, i + 1));
        }
    }

    if buf.len() < max_len {
        Err(EncodingError::UnexpectedEof {
            needed: buf.len() + 1,
            available: buf.len(),
        })
    } else {
        Err(EncodingError::VarintOverflow { bits })
    }
}

// ------------------------------------------------------------------------------------------------
// Varints
// ------------------------------------------------------------------------------------------------

/// Append `value` as a 32-bit varint.
#[inline]
pub fn put_varint32(buf: &mut Vec<u8>, value: u32) {
    put_varint64(buf, u64::from(value));
}

/// Append `value` as a 64-bit varint.
pub fn put_varint64(buf: &mut Vec<u8>, mut value: u64) {
    while value >= u64::from(CONTINUATION_BIT) {
        buf.push((value as u8 & PAYLOAD_MASK) | CONTINUATION_BIT);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode a 32-bit varint from the front of `buf`.
///
/// Returns `(value, bytes_consumed)`.
#[inline]
pub fn decode_varint32(buf: &[u8]) -> Result<(u32, usize), EncodingError> {
    // Single-byte values dominate block headers.
    if let Some(&first) = buf.first() {
        if first & CONTINUATION_BIT == 0 {
            return Ok((u32::from(first), 1));
        }
    }
    let (value, n) = decode_varint(buf, 32, MAX_VARINT32_LEN)?;
    Ok((value as u32, n))
}

/// Decode a 64-bit varint from the front of `buf`.
///
/// Returns `(value, bytes_consumed)`.
#[inline]
pub fn decode_varint64(buf: &[u8]) -> Result<(u64, usize), EncodingError> {
    decode_varint(buf, 64, MAX_VARINT64_LEN)
}

/// Number of bytes `value` occupies when varint-encoded.
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= u64::from(CONTINUATION_BIT) {
        value >>= 7;
        len += 1;
    }
    len
}

// ------------------------------------------------------------------------------------------------
// Fixed-width integers
// ------------------------------------------------------------------------------------------------

/// Append `value` as 4 little-endian bytes.
#[inline]
pub fn put_fixed32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Decode a little-endian `u32` from the front of `buf`.
#[inline]
pub fn decode_fixed32(buf: &[u8]) -> Result<u32, EncodingError> {
    require(buf, FIXED32_LEN)?;
    let mut bytes = [0u8; FIXED32_LEN];
    bytes.copy_from_slice(&buf[..FIXED32_LEN]);
    Ok(u32::from_le_bytes(bytes))
}

// ------------------------------------------------------------------------------------------------
// Prefix compression
// ------------------------------------------------------------------------------------------------

/// Length of the longest common prefix of `a` and `b`.
#[inline]
pub fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
