//! Core data structures for DB2 format components.
//!
//! This module defines the fundamental types used throughout the library:
//! - The fixed-size file header and its flags
//! - Per-field storage info entries
//! - Version and storage type enumerations

use std::ops::Range;

use super::error::{Db2Error, Result};

/// Size of the fixed file header in bytes.
pub const HEADER_SIZE: usize = 72;

/// Size of one field storage info entry in bytes.
pub const FIELD_INFO_SIZE: usize = 24;

/// DB2 format revision, identified by the 4-byte magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Db2Version {
    /// String offsets are absolute positions inside the string block.
    Wdc1,
    /// String offsets are relative to the field's own position.
    Wdc2,
}

impl Db2Version {
    pub fn magic(&self) -> [u8; 4] {
        match self {
            Db2Version::Wdc1 => *b"WDC1",
            Db2Version::Wdc2 => *b"WDC2",
        }
    }
}

impl TryFrom<[u8; 4]> for Db2Version {
    type Error = Db2Error;
    fn try_from(magic: [u8; 4]) -> Result<Self> {
        match &magic {
            b"WDC1" => Ok(Self::Wdc1),
            b"WDC2" => Ok(Self::Wdc2),
            _ => Err(Db2Error::MalformedHeader(format!(
                "Unrecognized magic {:?}",
                String::from_utf8_lossy(&magic)
            ))),
        }
    }
}

/// Header flag bitmask.
///
/// - Bit 0x04: record ids are stored in a trailing id list
/// - Bit 0x80: the string block is UTF-16LE instead of UTF-8
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFlags(pub u16);

impl HeaderFlags {
    pub const ID_LIST: u16 = 0x04;
    pub const WIDE_STRINGS: u16 = 0x80;

    pub fn has_id_list(&self) -> bool {
        self.0 & Self::ID_LIST != 0
    }

    pub fn wide_strings(&self) -> bool {
        self.0 & Self::WIDE_STRINGS != 0
    }

    pub fn with(self, bit: u16, on: bool) -> Self {
        if on {
            HeaderFlags(self.0 | bit)
        } else {
            HeaderFlags(self.0 & !bit)
        }
    }
}

impl std::fmt::Display for HeaderFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Parsed fixed-size header of a DB2 file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Db2Header {
    pub version: Db2Version,
    pub record_count: u32,
    pub field_count: u32,
    pub record_size: u32,
    pub string_table_size: u32,
    pub table_hash: u32,
    pub layout_hash: u32,
    pub min_id: u32,
    pub max_id: u32,
    pub locale: u32,
    pub flags: HeaderFlags,
    /// Index of the id column, or -1 when ids are not stored inline.
    pub id_field_index: i16,
    pub total_field_count: u32,
    /// Byte offset inside a record where the bit-packed region begins.
    pub bitpacked_data_offset: u32,
    pub lookup_column_count: u32,
    pub field_storage_info_size: u32,
    pub common_data_size: u32,
    pub pallet_data_size: u32,
    pub id_list_size: u32,
}

impl Db2Header {
    /// Returns the id column index, if ids are stored inline.
    pub fn id_field(&self) -> Option<usize> {
        usize::try_from(self.id_field_index).ok()
    }

    /// Computes where each block lives in the file.
    ///
    /// ```text
    /// [header][field info][records][strings][pallet][common][id list]
    /// ```
    pub fn blocks(&self) -> BlockLayout {
        let mut cursor = HEADER_SIZE as u64;
        let mut next = |len: u64| {
            let start = cursor;
            cursor += len;
            start..cursor
        };
        let field_info = next(self.field_storage_info_size as u64);
        let records = next(self.record_count as u64 * self.record_size as u64);
        let strings = next(self.string_table_size as u64);
        let pallet = next(self.pallet_data_size as u64);
        let common = next(self.common_data_size as u64);
        let id_list = next(self.id_list_size as u64);
        BlockLayout {
            field_info,
            records,
            strings,
            pallet,
            common,
            id_list,
        }
    }
}

/// Absolute byte ranges of every block, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    pub field_info: Range<u64>,
    pub records: Range<u64>,
    pub strings: Range<u64>,
    pub pallet: Range<u64>,
    pub common: Range<u64>,
    pub id_list: Range<u64>,
}

impl BlockLayout {
    /// Total file size this layout requires.
    pub fn end(&self) -> u64 {
        self.id_list.end
    }
}

/// How a field is physically stored, as recorded in the field storage info block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Inline,
    BitPacked,
    CommonData,
    Pallet,
    PalletArray,
    BitPackedSigned,
}

impl From<StorageType> for u32 {
    fn from(value: StorageType) -> u32 {
        match value {
            StorageType::Inline => 0,
            StorageType::BitPacked => 1,
            StorageType::CommonData => 2,
            StorageType::Pallet => 3,
            StorageType::PalletArray => 4,
            StorageType::BitPackedSigned => 5,
        }
    }
}

impl TryFrom<u32> for StorageType {
    type Error = Db2Error;
    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Inline),
            1 => Ok(Self::BitPacked),
            2 => Ok(Self::CommonData),
            3 => Ok(Self::Pallet),
            4 => Ok(Self::PalletArray),
            5 => Ok(Self::BitPackedSigned),
            _ => Err(Db2Error::MalformedHeader(format!("Unknown storage type: {}", value))),
        }
    }
}

/// One entry of the field storage info block.
///
/// Bit-packed and pallet fields take their position and width from here
/// rather than from the schema, so an encoder is free to repack them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldStorageInfo {
    pub bit_offset: u16,
    pub bit_width: u16,
    /// Bytes this field owns in the pallet or common block.
    pub additional_data_size: u32,
    pub storage_type: StorageType,
    /// Kind-specific parameters: default value for common data, arity for
    /// pallet arrays.
    pub params: [u32; 3],
}
