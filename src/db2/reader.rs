//! Record decoding: turns record slots into typed [`Record`]s.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, trace};

use super::codec::bits::read_bits;
use super::codec::strings::{read_string, StringEncoding};
use super::format::{blocks, header};
use super::iter::RecordIter;
use super::schema::{mask, sign_extend, FieldDescriptor, FieldType, Schema, StorageKind};
use super::table::{Record, Table};
use super::types::error::{Db2Error, Result};
use super::types::models::{Db2Header, Db2Version, FieldStorageInfo, StorageType};
use super::types::value::Value;

/// A DB2 file opened over an in-memory buffer.
///
/// Opening parses the header and auxiliary blocks once; records are decoded
/// on demand, so [`Db2File::records`] can be restarted at any time.
#[derive(Debug)]
pub struct Db2File<'a> {
    header: Db2Header,
    schema: Arc<Schema>,
    layout: Vec<FieldStorageInfo>,
    records: &'a [u8],
    strings: &'a [u8],
    pallets: Vec<Vec<u32>>,
    common: Vec<HashMap<u32, u32>>,
    ids: Option<Vec<u32>>,
    encoding: StringEncoding,
}

impl<'a> Db2File<'a> {
    /// Parses the header of `bytes` and opens it with `schema`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The header is malformed
    /// - `schema` does not describe this file's layout
    /// - An auxiliary block is inconsistent with the field info
    pub fn open(bytes: &'a [u8], schema: Arc<Schema>) -> Result<Self> {
        let header = header::read_header(bytes)?;
        Self::from_parts(bytes, header, schema)
    }

    /// Opens `bytes` using an already parsed header.
    pub fn from_parts(bytes: &'a [u8], header: Db2Header, schema: Arc<Schema>) -> Result<Self> {
        schema.check_header(&header)?;
        let blocks = header.blocks();

        let records_start = blocks.records.start as usize;
        let record_size = header.record_size as usize;
        let available = bytes.len().saturating_sub(records_start);
        if (available as u64) < blocks.records.end - blocks.records.start {
            let slot = available / record_size.max(1);
            return Err(Db2Error::TruncatedRecord {
                slot,
                expected: record_size,
                found: available - slot * record_size,
            });
        }
        if blocks.end() > bytes.len() as u64 {
            return Err(Db2Error::MalformedHeader(format!(
                "Declared blocks end at byte {}, input is {} bytes",
                blocks.end(),
                bytes.len()
            )));
        }
        let slice = move |range: std::ops::Range<u64>| -> &'a [u8] {
            &bytes[range.start as usize..range.end as usize]
        };

        let names: Vec<&str> = schema.field_names().collect();
        let layout = if header.field_storage_info_size == 0 {
            inline_layout(&schema)?
        } else {
            blocks::parse_field_info(slice(blocks.field_info.clone()), names.len())?
        };
        check_layout(&schema, &layout, &header)?;

        let pallets = blocks::split_block(slice(blocks.pallet.clone()), &layout, &names, |t| {
            matches!(t, StorageType::Pallet | StorageType::PalletArray)
        })?
        .into_iter()
        .zip(&names)
        .map(|(data, name)| blocks::parse_u32_values(data, name))
        .collect::<Result<Vec<_>>>()?;
        let common = blocks::split_block(slice(blocks.common.clone()), &layout, &names, |t| {
            t == StorageType::CommonData
        })?
        .into_iter()
        .zip(&names)
        .map(|(data, name)| blocks::parse_common_entries(data, name))
        .collect::<Result<Vec<_>>>()?;

        let ids = if header.flags.has_id_list() {
            Some(blocks::parse_u32_values(slice(blocks.id_list.clone()), "id list")?)
        } else {
            None
        };

        let encoding = StringEncoding::from_flags(header.flags);
        info!(
            "Opened '{}': {} records of {} bytes, {} string bytes ({:?})",
            schema.name, header.record_count, header.record_size, header.string_table_size, encoding
        );

        Ok(Self {
            records: slice(blocks.records.clone()),
            strings: slice(blocks.strings.clone()),
            header,
            schema,
            layout,
            pallets,
            common,
            ids,
            encoding,
        })
    }

    pub fn header(&self) -> &Db2Header {
        &self.header
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Field layout as stored in the file (or derived from the schema).
    pub fn layout(&self) -> &[FieldStorageInfo] {
        &self.layout
    }

    /// Number of record slots.
    pub fn len(&self) -> usize {
        self.header.record_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a fresh iterator over all records in slot order.
    pub fn records(&self) -> RecordIter<'_, 'a> {
        RecordIter::new(self)
    }

    /// Decodes the record in slot `slot`.
    pub fn record_at(&self, slot: usize) -> Result<Record> {
        let record_size = self.header.record_size as usize;
        let start = slot * record_size;
        let bytes = self.records.get(start..start + record_size).ok_or_else(|| {
            Db2Error::TruncatedRecord {
                slot,
                expected: record_size,
                found: self.records.len().saturating_sub(start),
            }
        })?;

        let id = self.record_id(slot, bytes)?;
        let values = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(index, field)| self.read_field(index, field, slot, bytes, id))
            .collect::<Result<Vec<_>>>()?;
        trace!("Decoded record {} (slot {})", id, slot);
        Ok(Record::new(id, values))
    }

    /// Decodes every record into a [`Table`].
    ///
    /// Nothing is returned unless every record decodes. Inline-id tables are
    /// ordered by ascending id.
    pub fn into_table(self) -> Result<Table> {
        let records = self.records().collect::<Result<Vec<_>>>()?;
        debug!("Decoded {} records for '{}'", records.len(), self.schema.name);
        Table::from_decoded(self.header, self.schema, records)
    }

    fn record_id(&self, slot: usize, bytes: &[u8]) -> Result<u32> {
        if let Some(ids) = &self.ids {
            return ids.get(slot).copied().ok_or_else(|| {
                Db2Error::out_of_range("id list", format!("no id for slot {}", slot))
            });
        }
        match self.schema.id_field() {
            Some(index) => {
                let field = &self.schema.fields()[index];
                let raw = self.read_raw(index, field, bytes, 0)?;
                u32::try_from(raw).map_err(|_| {
                    Db2Error::out_of_range(&field.name, format!("id {} exceeds 32 bits", raw))
                })
            }
            None => Ok(self.header.min_id.wrapping_add(slot as u32)),
        }
    }

    /// Reads the raw bits of element `element` of a record-resident field.
    fn read_raw(&self, index: usize, field: &FieldDescriptor, bytes: &[u8], element: u32) -> Result<u64> {
        let info = &self.layout[index];
        let width = info.bit_width as u32;
        let offset = info.bit_offset as u64 + element as u64 * width as u64;
        read_bits(bytes, offset, width).ok_or_else(|| {
            Db2Error::out_of_range(
                &field.name,
                format!("bits [{}..{}] exceed record of {} bytes", offset, offset + width as u64, bytes.len()),
            )
        })
    }

    fn read_field(
        &self,
        index: usize,
        field: &FieldDescriptor,
        slot: usize,
        bytes: &[u8],
        id: u32,
    ) -> Result<Value> {
        match &field.storage {
            StorageKind::Inline { .. } => self.collect(field, |element| {
                let raw = self.read_raw(index, field, bytes, element)?;
                if field.value_type == FieldType::Text {
                    let text = self.resolve_string(field, slot, index, element, raw)?;
                    return Ok(Value::Text(text));
                }
                Ok(field.scalar_from_raw(raw))
            }),
            StorageKind::BitPacked => {
                let info = &self.layout[index];
                let mut raw = self.read_raw(index, field, bytes, 0)?;
                if info.storage_type == StorageType::BitPackedSigned {
                    raw = sign_extend(raw, info.bit_width as u32) as u64 & mask(field.bit_width);
                }
                Ok(field.scalar_from_raw(raw))
            }
            StorageKind::CommonData { default } => match self.common[index].get(&id) {
                Some(&raw) => stored_value(field, raw, "common data"),
                None => Ok(default.clone()),
            },
            StorageKind::Pallet => {
                let pallet = &self.pallets[index];
                let index_value = self.read_raw(index, field, bytes, 0)?;
                let past_end = || {
                    Db2Error::out_of_range(
                        &field.name,
                        format!("pallet index {} exceeds {} entries", index_value, pallet.len()),
                    )
                };
                let base = usize::try_from(index_value)
                    .ok()
                    .and_then(|i| i.checked_mul(field.arity as usize))
                    .ok_or_else(past_end)?;
                self.collect(field, |element| {
                    let raw = base
                        .checked_add(element as usize)
                        .and_then(|slot| pallet.get(slot))
                        .ok_or_else(past_end)?;
                    stored_value(field, *raw, "pallet")
                })
            }
        }
    }

    /// Builds a scalar or array value from per-element reads.
    fn collect(&self, field: &FieldDescriptor, read: impl Fn(u32) -> Result<Value>) -> Result<Value> {
        if !field.is_array() {
            return read(0);
        }
        (0..field.arity)
            .map(read)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    /// Resolves a string field's stored offset to text.
    ///
    /// WDC2 offsets are relative to the field's own byte position in the
    /// record block; the string block directly follows the records.
    fn resolve_string(
        &self,
        field: &FieldDescriptor,
        slot: usize,
        index: usize,
        element: u32,
        raw: u64,
    ) -> Result<String> {
        let position = match self.header.version {
            Db2Version::Wdc1 => raw,
            Db2Version::Wdc2 => {
                let info = &self.layout[index];
                let field_bit = info.bit_offset as u64 + element as u64 * info.bit_width as u64;
                let cursor = (slot as u64 * self.header.record_size as u64) + field_bit / 8;
                (cursor + raw)
                    .checked_sub(self.records.len() as u64)
                    .ok_or_else(|| {
                        Db2Error::out_of_range(
                            &field.name,
                            format!("string offset {} points into the record block", raw),
                        )
                    })?
            }
        };
        if position >= self.strings.len() as u64 {
            return Err(Db2Error::out_of_range(
                &field.name,
                format!("string offset {} exceeds string block of {} bytes", position, self.strings.len()),
            ));
        }
        read_string(self.strings, position as usize, self.encoding).ok_or_else(|| {
            Db2Error::out_of_range(&field.name, format!("unterminated or undecodable string at {}", position))
        })
    }
}

/// Builds a value from a pallet or common data entry, which must fit the
/// field's logical width.
fn stored_value(field: &FieldDescriptor, raw: u32, block: &str) -> Result<Value> {
    let raw = raw as u64;
    if raw > mask(field.bit_width) {
        return Err(Db2Error::out_of_range(
            &field.name,
            format!("{} value {:#x} exceeds {} bits", block, raw, field.bit_width),
        ));
    }
    Ok(field.scalar_from_raw(raw))
}

/// Decodes a whole table from `bytes` with an already parsed header.
pub fn decode(bytes: &[u8], header: Db2Header, schema: Arc<Schema>) -> Result<Table> {
    Db2File::from_parts(bytes, header, schema)?.into_table()
}

/// Derives field info for files that carry none; only inline layouts qualify.
fn inline_layout(schema: &Schema) -> Result<Vec<FieldStorageInfo>> {
    schema
        .fields()
        .iter()
        .map(|field| match field.storage {
            StorageKind::Inline { bit_offset } => Ok(FieldStorageInfo {
                bit_offset: bit_offset as u16,
                bit_width: field.bit_width as u16,
                additional_data_size: 0,
                storage_type: StorageType::Inline,
                params: [0; 3],
            }),
            _ => Err(Db2Error::MalformedHeader(format!(
                "field '{}' needs field storage info, but the file has none",
                field.name
            ))),
        })
        .collect()
}

/// Checks that the file's storage info agrees with the schema.
fn check_layout(schema: &Schema, layout: &[FieldStorageInfo], header: &Db2Header) -> Result<()> {
    let record_bits = header.record_size as u64 * 8;
    for (field, info) in schema.fields().iter().zip(layout) {
        let agrees = match &field.storage {
            StorageKind::Inline { bit_offset } => {
                info.storage_type == StorageType::Inline
                    && info.bit_offset as u32 == *bit_offset
                    && info.bit_width as u32 == field.bit_width
            }
            StorageKind::BitPacked => {
                matches!(info.storage_type, StorageType::BitPacked | StorageType::BitPackedSigned)
                    && info.bit_width as u32 <= field.bit_width
            }
            StorageKind::CommonData { .. } => info.storage_type == StorageType::CommonData,
            StorageKind::Pallet if field.is_array() => {
                info.storage_type == StorageType::PalletArray && info.params[2] == field.arity
            }
            StorageKind::Pallet => info.storage_type == StorageType::Pallet,
        };
        if !agrees {
            return Err(Db2Error::SchemaNotFound {
                layout_hash: header.layout_hash,
                detail: format!("field '{}' is stored as {:?}", field.name, info.storage_type),
            });
        }

        let max_width = match info.storage_type {
            StorageType::Pallet | StorageType::PalletArray => 32,
            _ => 64,
        };
        if info.bit_width > max_width {
            return Err(Db2Error::out_of_range(
                &field.name,
                format!("stored width {} exceeds {} bits", info.bit_width, max_width),
            ));
        }

        let element_count = match info.storage_type {
            StorageType::Inline => field.arity as u64,
            StorageType::CommonData => 0,
            _ => 1,
        };
        let end = info.bit_offset as u64 + info.bit_width as u64 * element_count;
        if header.record_count > 0 && end > record_bits {
            return Err(Db2Error::out_of_range(
                &field.name,
                format!("bits [{}..{}] exceed record size of {} bytes", info.bit_offset, end, header.record_size),
            ));
        }
        trace!("Field '{}' at bit {} width {} ({:?})", field.name, info.bit_offset, info.bit_width, info.storage_type);
    }
    debug!("Field layout agrees with schema '{}'", schema.name);
    Ok(())
}
