//! Little-endian bit field access within record bytes.
//!
//! Bit `n` of a record is bit `n % 8` of byte `n / 8`, so a field that
//! starts on a byte boundary with a whole-byte width reads exactly like a
//! little-endian integer of that size.

use crate::db2::schema::mask;

/// Reads `width` bits (at most 64) starting at `bit_offset`.
///
/// Returns `None` when the range extends past `data` or `width` exceeds 64.
pub fn read_bits(data: &[u8], bit_offset: u64, width: u32) -> Option<u64> {
    if width == 0 {
        return Some(0);
    }
    if width > 64 {
        return None;
    }
    let end = bit_offset.checked_add(width as u64)?;
    if end > data.len() as u64 * 8 {
        return None;
    }

    let start_byte = (bit_offset / 8) as usize;
    let shift = (bit_offset % 8) as u32;
    let byte_count = ((shift + width + 7) / 8) as usize;

    let acc = data[start_byte..start_byte + byte_count]
        .iter()
        .enumerate()
        .fold(0u128, |acc, (i, &b)| acc | (b as u128) << (8 * i));
    Some(((acc >> shift) as u64) & mask(width))
}

/// Writes the low `width` bits of `value` at `bit_offset`, leaving
/// neighbouring bits untouched.
///
/// The caller sizes `buf` so the range fits.
pub fn write_bits(buf: &mut [u8], bit_offset: u64, width: u32, value: u64) {
    if width == 0 {
        return;
    }
    let start_byte = (bit_offset / 8) as usize;
    let shift = (bit_offset % 8) as u32;
    let byte_count = ((shift + width + 7) / 8) as usize;
    let bytes = &mut buf[start_byte..start_byte + byte_count];

    let mut acc = bytes
        .iter()
        .enumerate()
        .fold(0u128, |acc, (i, &b)| acc | (b as u128) << (8 * i));
    let field_mask = (mask(width) as u128) << shift;
    acc = (acc & !field_mask) | (((value & mask(width)) as u128) << shift);

    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (acc >> (8 * i)) as u8;
    }
}

/// Minimal width able to hold every unsigned value up to `max`. Never 0.
pub fn unsigned_width(max: u64) -> u32 {
    (64 - max.leading_zeros()).max(1)
}

/// Minimal two's complement width able to hold every value in `min..=max`.
pub fn signed_width(min: i64, max: i64) -> u32 {
    let magnitude = |v: i64| if v < 0 { !v as u64 } else { v as u64 };
    unsigned_width(magnitude(min).max(magnitude(max))) + 1
}
