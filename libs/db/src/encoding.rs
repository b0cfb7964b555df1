//! Fixed-width integer codecs for on-disk records.
//!
//! All multi-byte integers inside keys and values use little-endian
//! fixed-width encoding. Producers, parsers, and the score-key comparator
//! must agree on this; nothing else in the crate touches raw byte order.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Append a little-endian u32 to `dst`.
pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    dst.extend_from_slice(&buf);
}

/// Append a little-endian u64 to `dst`.
pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    dst.extend_from_slice(&buf);
}

/// Decode a little-endian u32 from the first 4 bytes of `src`.
pub fn decode_fixed32(src: &[u8]) -> Result<u32> {
    if src.len() < 4 {
        return Err(Error::Corruption(format!(
            "fixed32 needs 4 bytes, got {}",
            src.len()
        )));
    }
    Ok(LittleEndian::read_u32(&src[..4]))
}

/// Decode a little-endian u64 from the first 8 bytes of `src`.
pub fn decode_fixed64(src: &[u8]) -> Result<u64> {
    if src.len() < 8 {
        return Err(Error::Corruption(format!(
            "fixed64 needs 8 bytes, got {}",
            src.len()
        )));
    }
    Ok(LittleEndian::read_u64(&src[..8]))
}
