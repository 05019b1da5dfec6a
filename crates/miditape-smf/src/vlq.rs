//! Variable-length quantities: 7 bits per byte, high bit flags continuation.

use crate::error::{Error, Result};

/// Largest value a four-byte VLQ can hold.
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;

const MAX_VLQ_BYTES: usize = 4;

/// Decode the VLQ starting at `offset`. Returns the value and bytes consumed.
pub fn read_vlq(buf: &[u8], offset: usize) -> Result<(u32, usize)> {
    let mut value = 0u32;
    for i in 0..MAX_VLQ_BYTES {
        let Some(&byte) = buf.get(offset + i) else {
            return Err(Error::Truncated {
                context: "variable-length quantity",
                offset: offset + i,
            });
        };
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::VlqTooLong { offset })
}

/// Append the shortest encoding of `value`.
pub fn write_vlq(out: &mut Vec<u8>, value: u32) -> Result<()> {
    if value > MAX_VLQ {
        return Err(Error::DeltaOverflow(value as u64));
    }
    let mut bytes = [0u8; MAX_VLQ_BYTES];
    let mut i = MAX_VLQ_BYTES - 1;
    let mut rest = value;
    bytes[i] = (rest & 0x7F) as u8;
    rest >>= 7;
    while rest > 0 {
        i -= 1;
        bytes[i] = ((rest & 0x7F) | 0x80) as u8;
        rest >>= 7;
    }
    out.extend_from_slice(&bytes[i..]);
    Ok(())
}

/// Encoded size of `value` in bytes.
#[inline]
pub fn vlq_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        _ => 4,
    }
}
