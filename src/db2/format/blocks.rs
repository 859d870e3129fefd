//! Auxiliary block parsing: field storage info, pallet, common data and id list.
//!
//! Pallet and common blocks are shared by several fields. Each field owns
//! `additional_data_size` consecutive bytes, in field order, of the block
//! that matches its storage type.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, trace};

use crate::db2::types::error::{Db2Error, Result};
use crate::db2::types::models::{FieldStorageInfo, StorageType, FIELD_INFO_SIZE};

/// Parses `field_count` 24-byte storage info entries.
///
/// Entry layout:
/// - 2 bytes: bit offset inside the record
/// - 2 bytes: bit width
/// - 4 bytes: additional data size (bytes in pallet/common block)
/// - 4 bytes: storage type
/// - 12 bytes: three type-specific parameters
pub fn parse_field_info(block: &[u8], field_count: usize) -> Result<Vec<FieldStorageInfo>> {
    if block.len() != field_count * FIELD_INFO_SIZE {
        return Err(Db2Error::MalformedHeader(format!(
            "Field storage info is {} bytes, expected {}",
            block.len(),
            field_count * FIELD_INFO_SIZE
        )));
    }

    let mut reader = block;
    let mut infos = Vec::with_capacity(field_count);
    for index in 0..field_count {
        let info = read_entry(&mut reader).map_err(|e| {
            Db2Error::MalformedHeader(format!("Failed to read field info {}: {}", index, e))
        })?;
        let storage_type = StorageType::try_from(info.3)?;
        let info = FieldStorageInfo {
            bit_offset: info.0,
            bit_width: info.1,
            additional_data_size: info.2,
            storage_type,
            params: info.4,
        };
        trace!("Field {} storage: {:?}", index, info);
        infos.push(info);
    }
    Ok(infos)
}

type RawEntry = (u16, u16, u32, u32, [u32; 3]);

fn read_entry(reader: &mut &[u8]) -> std::io::Result<RawEntry> {
    Ok((
        reader.read_u16::<LittleEndian>()?,
        reader.read_u16::<LittleEndian>()?,
        reader.read_u32::<LittleEndian>()?,
        reader.read_u32::<LittleEndian>()?,
        [
            reader.read_u32::<LittleEndian>()?,
            reader.read_u32::<LittleEndian>()?,
            reader.read_u32::<LittleEndian>()?,
        ],
    ))
}

/// Serializes storage info entries in file order.
pub fn write_field_info(infos: &[FieldStorageInfo], out: &mut Vec<u8>) {
    // Writes into a Vec cannot fail.
    let _ = infos.iter().try_for_each(|info| -> std::io::Result<()> {
        out.write_u16::<LittleEndian>(info.bit_offset)?;
        out.write_u16::<LittleEndian>(info.bit_width)?;
        out.write_u32::<LittleEndian>(info.additional_data_size)?;
        out.write_u32::<LittleEndian>(info.storage_type.into())?;
        for param in info.params {
            out.write_u32::<LittleEndian>(param)?;
        }
        Ok(())
    });
}

/// Splits a shared block into per-field slices.
///
/// Fields whose storage type does not satisfy `owns` get an empty slice.
pub fn split_block<'a>(
    block: &'a [u8],
    infos: &[FieldStorageInfo],
    names: &[&str],
    owns: impl Fn(StorageType) -> bool,
) -> Result<Vec<&'a [u8]>> {
    let mut cursor = 0usize;
    let mut slices = Vec::with_capacity(infos.len());
    for (info, name) in infos.iter().zip(names) {
        if !owns(info.storage_type) {
            slices.push(&block[0..0]);
            continue;
        }
        let end = cursor + info.additional_data_size as usize;
        let slice = block.get(cursor..end).ok_or_else(|| {
            Db2Error::out_of_range(
                name,
                format!("data [{}..{}] exceeds block of {} bytes", cursor, end, block.len()),
            )
        })?;
        slices.push(slice);
        cursor = end;
    }
    debug!("Split {} byte block, {} bytes claimed by fields", block.len(), cursor);
    Ok(slices)
}

/// Parses one field's common data: `(record_id, value)` pairs of u32.
pub fn parse_common_entries(data: &[u8], field: &str) -> Result<HashMap<u32, u32>> {
    if data.len() % 8 != 0 {
        return Err(Db2Error::out_of_range(
            field,
            format!("common data of {} bytes is not a whole number of entries", data.len()),
        ));
    }
    Ok(data
        .chunks_exact(8)
        .map(|entry| (LittleEndian::read_u32(&entry[0..4]), LittleEndian::read_u32(&entry[4..8])))
        .collect())
}

/// Parses a block of little-endian u32 values (pallets and the id list).
pub fn parse_u32_values(data: &[u8], field: &str) -> Result<Vec<u32>> {
    if data.len() % 4 != 0 {
        return Err(Db2Error::out_of_range(
            field,
            format!("{} bytes is not a whole number of 32-bit values", data.len()),
        ));
    }
    Ok(data.chunks_exact(4).map(LittleEndian::read_u32).collect())
}

/// Appends little-endian u32 values.
pub fn write_u32_values(values: impl IntoIterator<Item = u32>, out: &mut Vec<u8>) {
    for value in values {
        let _ = out.write_u32::<LittleEndian>(value);
    }
}
