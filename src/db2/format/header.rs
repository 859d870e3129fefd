//! DB2 file header parsing and serialization.
//!
//! # Header Structure
//! ```text
//! [4 bytes]  Magic ("WDC1" or "WDC2")
//! [4 bytes]  Record count
//! [4 bytes]  Field count
//! [4 bytes]  Record size
//! [4 bytes]  String table size
//! [4 bytes]  Table hash
//! [4 bytes]  Layout hash
//! [4 bytes]  Min id
//! [4 bytes]  Max id
//! [4 bytes]  Locale
//! [2 bytes]  Flags
//! [2 bytes]  Id field index (signed, -1 = none)
//! [4 bytes]  Total field count
//! [4 bytes]  Bit-packed data offset
//! [4 bytes]  Lookup column count
//! [4 bytes]  Field storage info size
//! [4 bytes]  Common data size
//! [4 bytes]  Pallet data size
//! [4 bytes]  Id list size
//! ```
//! All integers are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, trace};

use crate::db2::types::error::{Db2Error, Result};
use crate::db2::types::models::{Db2Header, Db2Version, HeaderFlags, FIELD_INFO_SIZE, HEADER_SIZE};

/// Parses and validates the fixed-size header at the start of `bytes`.
///
/// # Errors
/// Returns `MalformedHeader` if:
/// - The input is shorter than the header
/// - The magic is not a known DB2 revision
/// - Records exist but the record size or field count is zero
/// - The id field index is outside the field list
/// - Any declared block would extend past the end of the input
pub fn read_header(bytes: &[u8]) -> Result<Db2Header> {
    if bytes.len() < HEADER_SIZE {
        return Err(Db2Error::MalformedHeader(format!(
            "Input is {} bytes, header needs {}",
            bytes.len(),
            HEADER_SIZE
        )));
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[..4]);
    let version = Db2Version::try_from(magic)?;

    let mut reader = &bytes[4..HEADER_SIZE];
    let header = read_fields(&mut reader, version).map_err(|e| {
        Db2Error::MalformedHeader(format!("Failed to read header fields: {}", e))
    })?;
    trace!("Raw header: {:?}", header);

    validate(&header, bytes.len())?;

    info!(
        "Header parsed: version={:?}, records={}, fields={}, record_size={}, strings={} bytes, layout={:#010x}",
        header.version,
        header.record_count,
        header.field_count,
        header.record_size,
        header.string_table_size,
        header.layout_hash
    );
    Ok(header)
}

fn read_fields(reader: &mut &[u8], version: Db2Version) -> std::io::Result<Db2Header> {
    Ok(Db2Header {
        version,
        record_count: reader.read_u32::<LittleEndian>()?,
        field_count: reader.read_u32::<LittleEndian>()?,
        record_size: reader.read_u32::<LittleEndian>()?,
        string_table_size: reader.read_u32::<LittleEndian>()?,
        table_hash: reader.read_u32::<LittleEndian>()?,
        layout_hash: reader.read_u32::<LittleEndian>()?,
        min_id: reader.read_u32::<LittleEndian>()?,
        max_id: reader.read_u32::<LittleEndian>()?,
        locale: reader.read_u32::<LittleEndian>()?,
        flags: HeaderFlags(reader.read_u16::<LittleEndian>()?),
        id_field_index: reader.read_i16::<LittleEndian>()?,
        total_field_count: reader.read_u32::<LittleEndian>()?,
        bitpacked_data_offset: reader.read_u32::<LittleEndian>()?,
        lookup_column_count: reader.read_u32::<LittleEndian>()?,
        field_storage_info_size: reader.read_u32::<LittleEndian>()?,
        common_data_size: reader.read_u32::<LittleEndian>()?,
        pallet_data_size: reader.read_u32::<LittleEndian>()?,
        id_list_size: reader.read_u32::<LittleEndian>()?,
    })
}

fn validate(header: &Db2Header, file_size: usize) -> Result<()> {
    let malformed = |detail: String| Err(Db2Error::MalformedHeader(detail));

    if header.record_count > 0 && header.record_size == 0 {
        return malformed("Records declared with a record size of 0".to_string());
    }
    if header.record_count > 0 && header.field_count == 0 {
        return malformed("Records declared with a field count of 0".to_string());
    }
    if header.id_field_index < -1 || header.id_field_index as i64 >= header.field_count as i64 {
        return malformed(format!(
            "Id field index {} outside of {} fields",
            header.id_field_index, header.field_count
        ));
    }
    if header.field_storage_info_size != 0
        && header.field_storage_info_size as u64 != header.field_count as u64 * FIELD_INFO_SIZE as u64
    {
        return malformed(format!(
            "Field storage info is {} bytes, {} fields need {}",
            header.field_storage_info_size,
            header.field_count,
            header.field_count as u64 * FIELD_INFO_SIZE as u64
        ));
    }
    if header.flags.has_id_list() && header.id_list_size as u64 != header.record_count as u64 * 4 {
        return malformed(format!(
            "Id list is {} bytes for {} records",
            header.id_list_size, header.record_count
        ));
    }

    let blocks = header.blocks();
    debug!("Block layout: {:?}", blocks);
    if blocks.end() > file_size as u64 {
        return malformed(format!(
            "Declared blocks end at byte {}, input is {} bytes",
            blocks.end(),
            file_size
        ));
    }
    Ok(())
}

/// Serializes `header` in its on-disk layout.
pub fn write_header(header: &Db2Header, out: &mut Vec<u8>) {
    // Writes into a Vec cannot fail.
    let _ = write_fields(header, out);
}

fn write_fields(header: &Db2Header, out: &mut Vec<u8>) -> std::io::Result<()> {
    out.extend_from_slice(&header.version.magic());
    out.write_u32::<LittleEndian>(header.record_count)?;
    out.write_u32::<LittleEndian>(header.field_count)?;
    out.write_u32::<LittleEndian>(header.record_size)?;
    out.write_u32::<LittleEndian>(header.string_table_size)?;
    out.write_u32::<LittleEndian>(header.table_hash)?;
    out.write_u32::<LittleEndian>(header.layout_hash)?;
    out.write_u32::<LittleEndian>(header.min_id)?;
    out.write_u32::<LittleEndian>(header.max_id)?;
    out.write_u32::<LittleEndian>(header.locale)?;
    out.write_u16::<LittleEndian>(header.flags.0)?;
    out.write_i16::<LittleEndian>(header.id_field_index)?;
    out.write_u32::<LittleEndian>(header.total_field_count)?;
    out.write_u32::<LittleEndian>(header.bitpacked_data_offset)?;
    out.write_u32::<LittleEndian>(header.lookup_column_count)?;
    out.write_u32::<LittleEndian>(header.field_storage_info_size)?;
    out.write_u32::<LittleEndian>(header.common_data_size)?;
    out.write_u32::<LittleEndian>(header.pallet_data_size)?;
    out.write_u32::<LittleEndian>(header.id_list_size)?;
    Ok(())
}
