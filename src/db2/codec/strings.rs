//! String block reading and rebuilding.

use std::collections::HashMap;

use byteorder::{LittleEndian, WriteBytesExt};
use encoding_rs::{Encoding, UTF_16LE, UTF_8};

use crate::db2::types::models::HeaderFlags;

/// Text encoding of the string block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    Utf16Le,
}

impl StringEncoding {
    pub fn from_flags(flags: HeaderFlags) -> Self {
        if flags.wide_strings() {
            StringEncoding::Utf16Le
        } else {
            StringEncoding::Utf8
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        match self {
            StringEncoding::Utf8 => UTF_8,
            StringEncoding::Utf16Le => UTF_16LE,
        }
    }

    /// Byte width of one code unit, and of the null terminator.
    pub fn unit_width(&self) -> usize {
        match self {
            StringEncoding::Utf8 => 1,
            StringEncoding::Utf16Le => 2,
        }
    }
}

/// Reads the null-terminated string starting at `offset` in `block`.
///
/// Bytes are decoded as-is: a leading byte-order mark is kept as text, and
/// malformed sequences are not replaced.
///
/// Returns `None` when `offset` is outside the block, no terminator follows,
/// or the bytes are not valid in `encoding`.
pub fn read_string(block: &[u8], offset: usize, encoding: StringEncoding) -> Option<String> {
    let tail = block.get(offset..)?;
    let end_pos = match encoding.unit_width() {
        2 => tail
            .chunks_exact(2)
            .position(|chunk| chunk == [0, 0])
            .map(|chunk_index| chunk_index * 2),
        _ => tail.iter().position(|&byte| byte == 0),
    }?;
    encoding
        .encoding()
        .decode_without_bom_handling_and_without_replacement(&tail[..end_pos])
        .map(|decoded| decoded.into_owned())
}

/// Builds a deduplicated string block.
///
/// Offsets are handed out in first-seen order, so the same input always
/// produces the same block.
#[derive(Debug)]
pub struct StringTableBuilder {
    encoding: StringEncoding,
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringTableBuilder {
    pub fn new(encoding: StringEncoding) -> Self {
        Self {
            encoding,
            bytes: Vec::new(),
            offsets: HashMap::new(),
        }
    }

    /// Returns the offset of `text`, appending it on first sight.
    pub fn intern(&mut self, text: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(text) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        match self.encoding {
            StringEncoding::Utf8 => {
                self.bytes.extend_from_slice(text.as_bytes());
                self.bytes.push(0);
            }
            StringEncoding::Utf16Le => {
                for unit in text.encode_utf16().chain(std::iter::once(0)) {
                    // Writing into a Vec cannot fail.
                    let _ = self.bytes.write_u16::<LittleEndian>(unit);
                }
            }
        }
        self.offsets.insert(text.to_string(), offset);
        offset
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn unique_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
