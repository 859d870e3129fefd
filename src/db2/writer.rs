//! Record encoding: serializes a [`Table`] back to DB2 bytes.
//!
//! The encoder never reuses the packing it was decoded from. Bit-packed
//! widths, palettes, common data and the string block are rebuilt from the
//! values currently in the table, so edits that widen a value range are
//! always representable.

use std::collections::HashMap;

use log::{debug, info, trace};

use super::codec::bits::{signed_width, unsigned_width, write_bits};
use super::codec::strings::{StringEncoding, StringTableBuilder};
use super::format::blocks::{write_field_info, write_u32_values};
use super::format::header::write_header;
use super::schema::{mask, sign_extend, FieldDescriptor, FieldType, Schema, StorageKind};
use super::table::{Record, Table};
use super::types::error::{Db2Error, Result};
use super::types::models::{
    Db2Header, Db2Version, FieldStorageInfo, HeaderFlags, StorageType, FIELD_INFO_SIZE, HEADER_SIZE,
};
use super::types::value::Value;

/// Physical plan for one field.
#[derive(Debug)]
struct FieldPlan {
    info: FieldStorageInfo,
    /// Raw bits written into each record, in write order (bit-packed values
    /// and pallet indices).
    per_record: Vec<u64>,
    /// Flattened palette values.
    pallet: Vec<u32>,
    /// Non-default `(record_id, value)` pairs.
    common: Vec<(u32, u32)>,
}

impl FieldPlan {
    fn new(storage_type: StorageType) -> Self {
        Self {
            info: FieldStorageInfo {
                bit_offset: 0,
                bit_width: 0,
                additional_data_size: 0,
                storage_type,
                params: [0; 3],
            },
            per_record: Vec::new(),
            pallet: Vec::new(),
            common: Vec::new(),
        }
    }
}

/// Encodes `table` into a complete DB2 file.
///
/// # Errors
/// Returns `UnencodableValue` if a value has the wrong type or arity, does
/// not fit its field's width, or if the resulting layout cannot be
/// addressed by the format.
pub fn encode(table: &Table) -> Result<Vec<u8>> {
    let schema = table.schema();
    let template = table.header();

    let mut order: Vec<&Record> = table.records().iter().collect();
    if schema.id_field().is_some() {
        order.sort_by_key(|r| r.id());
    }
    for record in &order {
        check_record(schema, record)?;
    }

    let (mut plans, record_bits, packed_start) = plan_layout(schema, &order)?;
    let record_size = record_bits.div_ceil(8).max(1) as usize;
    let records_len = order.len() * record_size;

    let encoding = StringEncoding::from_flags(template.flags);
    let mut strings = StringTableBuilder::new(encoding);
    let mut records = vec![0u8; records_len];
    for (slot, record) in order.iter().enumerate() {
        let slot_start = slot * record_size;
        let bytes = &mut records[slot_start..slot_start + record_size];
        for (index, field) in schema.fields().iter().enumerate() {
            write_field(
                field,
                &plans[index],
                &record.values()[index],
                slot,
                WriteContext {
                    bytes: &mut *bytes,
                    slot_start,
                    records_len,
                    version: template.version,
                    strings: &mut strings,
                },
            )?;
        }
    }
    debug!(
        "String table: {} unique strings, {} bytes",
        strings.unique_count(),
        strings.len()
    );
    let strings = strings.finish();

    let ids: Vec<u32> = order.iter().map(|r| r.id()).collect();
    let contiguous = ids.windows(2).all(|w| w[0].checked_add(1) == Some(w[1]));
    let use_id_list = schema.id_field().is_none() && !contiguous;
    let min_id = ids.iter().copied().min().unwrap_or(0);
    let max_id = ids.iter().copied().max().unwrap_or(0);

    let mut pallet = Vec::new();
    let mut common = Vec::new();
    for plan in &mut plans {
        plan.info.additional_data_size = match plan.info.storage_type {
            StorageType::Pallet | StorageType::PalletArray => {
                write_u32_values(plan.pallet.iter().copied(), &mut pallet);
                (plan.pallet.len() * 4) as u32
            }
            StorageType::CommonData => {
                write_u32_values(plan.common.iter().flat_map(|&(id, v)| [id, v]), &mut common);
                (plan.common.len() * 8) as u32
            }
            _ => 0,
        };
    }

    let field_count = schema.fields().len() as u32;
    let header = Db2Header {
        version: template.version,
        record_count: order.len() as u32,
        field_count,
        record_size: record_size as u32,
        string_table_size: block_len(strings.len(), "string table")?,
        table_hash: schema.table_hash.unwrap_or(template.table_hash),
        layout_hash: schema.layout_hash,
        min_id,
        max_id,
        locale: template.locale,
        flags: template.flags.with(HeaderFlags::ID_LIST, use_id_list),
        id_field_index: schema.id_field().map_or(-1, |i| i as i16),
        total_field_count: field_count,
        bitpacked_data_offset: packed_start,
        lookup_column_count: template.lookup_column_count,
        field_storage_info_size: field_count * FIELD_INFO_SIZE as u32,
        common_data_size: block_len(common.len(), "common data")?,
        pallet_data_size: block_len(pallet.len(), "pallet data")?,
        id_list_size: if use_id_list { block_len(ids.len() * 4, "id list")? } else { 0 },
    };

    let mut out = Vec::with_capacity(header.blocks().end() as usize);
    write_header(&header, &mut out);
    debug_assert_eq!(out.len(), HEADER_SIZE);
    let infos: Vec<FieldStorageInfo> = plans.iter().map(|p| p.info).collect();
    write_field_info(&infos, &mut out);
    out.extend_from_slice(&records);
    out.extend_from_slice(&strings);
    out.extend_from_slice(&pallet);
    out.extend_from_slice(&common);
    if use_id_list {
        write_u32_values(ids.iter().copied(), &mut out);
    }

    info!(
        "Encoded '{}': {} records of {} bytes, {} string bytes, {} total bytes",
        schema.name,
        header.record_count,
        header.record_size,
        header.string_table_size,
        out.len()
    );
    Ok(out)
}

fn block_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Db2Error::unencodable(what, format!("{} bytes exceed 32-bit size", len)))
}

/// Checks arity, variants and id agreement before anything is laid out.
fn check_record(schema: &Schema, record: &Record) -> Result<()> {
    let fields = schema.fields();
    if record.values().len() != fields.len() {
        return Err(Db2Error::unencodable(
            &schema.name,
            format!("record {} has {} values for {} fields", record.id(), record.values().len(), fields.len()),
        ));
    }
    for (field, value) in fields.iter().zip(record.values()) {
        for element in elements(field, value)? {
            match (field.value_type, element) {
                (FieldType::Text, Value::Text(s)) if s.contains('\0') => {
                    return Err(Db2Error::unencodable(&field.name, "string contains a null character"));
                }
                (FieldType::Text, Value::Text(_)) => {}
                _ => {
                    field.scalar_to_raw(element)?;
                }
            }
        }
    }
    if let Some(index) = schema.id_field() {
        let value = &record.values()[index];
        if value.as_u32() != Some(record.id()) {
            return Err(Db2Error::unencodable(
                &fields[index].name,
                format!("id column holds {} but record id is {}", value, record.id()),
            ));
        }
    }
    Ok(())
}

/// Splits a value into its elements, checking arity.
fn elements<'v>(field: &FieldDescriptor, value: &'v Value) -> Result<Vec<&'v Value>> {
    match value {
        Value::Array(items) if field.is_array() => {
            if items.len() != field.arity as usize {
                return Err(Db2Error::unencodable(
                    &field.name,
                    format!("expected {} elements, found {}", field.arity, items.len()),
                ));
            }
            Ok(items.iter().collect())
        }
        other if !field.is_array() && !matches!(other, Value::Array(_)) => Ok(vec![other]),
        other => Err(Db2Error::unencodable(
            &field.name,
            format!("arity {} does not accept a {} value", field.arity, other.kind()),
        )),
    }
}

/// Chooses storage info for every field and computes per-record packed bits.
///
/// Returns the plans, the record width in bits, and the byte offset where
/// the bit-packed region starts.
fn plan_layout(schema: &Schema, order: &[&Record]) -> Result<(Vec<FieldPlan>, u64, u32)> {
    let packed_start = schema.inline_bits().div_ceil(8);
    let mut cursor = packed_start * 8;
    let mut plans = Vec::with_capacity(schema.fields().len());

    for (index, field) in schema.fields().iter().enumerate() {
        let column = order.iter().map(|r| &r.values()[index]);
        let plan = match &field.storage {
            StorageKind::Inline { bit_offset } => {
                let mut plan = FieldPlan::new(StorageType::Inline);
                plan.info.bit_offset = *bit_offset as u16;
                plan.info.bit_width = field.bit_width as u16;
                plan
            }
            StorageKind::BitPacked => {
                let mut plan = plan_bitpacked(field, column)?;
                plan.info.bit_offset = checked_offset(cursor, field)?;
                cursor += plan.info.bit_width as u64;
                plan
            }
            StorageKind::Pallet => {
                let mut plan = plan_pallet(field, column)?;
                plan.info.bit_offset = checked_offset(cursor, field)?;
                cursor += plan.info.bit_width as u64;
                plan
            }
            StorageKind::CommonData { default } => {
                let mut plan = FieldPlan::new(StorageType::CommonData);
                let default_raw = field.scalar_to_raw(default)?;
                plan.info.bit_offset = checked_offset(cursor, field)?;
                plan.info.params[0] = default_raw as u32;
                for (record, value) in order.iter().zip(column) {
                    let raw = field.scalar_to_raw(value)?;
                    if raw != default_raw {
                        plan.common.push((record.id(), raw as u32));
                    }
                }
                plan
            }
        };
        trace!(
            "Planned '{}': {:?} at bit {} width {}",
            field.name, plan.info.storage_type, plan.info.bit_offset, plan.info.bit_width
        );
        plans.push(plan);
    }
    checked_offset(cursor, &schema.fields()[0])?;
    Ok((plans, cursor, packed_start as u32))
}

fn checked_offset(bits: u64, field: &FieldDescriptor) -> Result<u16> {
    u16::try_from(bits).map_err(|_| {
        Db2Error::unencodable(&field.name, format!("record layout reaches bit {}, beyond 65535", bits))
    })
}

fn plan_bitpacked<'v>(field: &FieldDescriptor, column: impl Iterator<Item = &'v Value>) -> Result<FieldPlan> {
    let raws = column.map(|v| field.scalar_to_raw(v)).collect::<Result<Vec<_>>>()?;

    let (storage_type, width) = if field.signed() {
        let values: Vec<i64> = raws
            .iter()
            .map(|&raw| sign_extend(raw, field.bit_width))
            .collect();
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        (StorageType::BitPackedSigned, signed_width(min, max).min(field.bit_width))
    } else {
        let max = raws.iter().copied().max().unwrap_or(0);
        (StorageType::BitPacked, unsigned_width(max).min(field.bit_width))
    };

    let mut plan = FieldPlan::new(storage_type);
    plan.info.bit_width = width as u16;
    plan.per_record = raws.into_iter().map(|raw| raw & mask(width)).collect();
    Ok(plan)
}

fn plan_pallet<'v>(field: &FieldDescriptor, column: impl Iterator<Item = &'v Value>) -> Result<FieldPlan> {
    let storage_type = if field.is_array() { StorageType::PalletArray } else { StorageType::Pallet };
    let mut plan = FieldPlan::new(storage_type);
    let mut seen: HashMap<Vec<u32>, u64> = HashMap::new();

    for value in column {
        let entry = elements(field, value)?
            .into_iter()
            .map(|element| field.scalar_to_raw(element).map(|raw| raw as u32))
            .collect::<Result<Vec<_>>>()?;
        let next = seen.len() as u64;
        let index = *seen.entry(entry.clone()).or_insert_with(|| {
            plan.pallet.extend_from_slice(&entry);
            next
        });
        plan.per_record.push(index);
    }

    plan.info.bit_width = unsigned_width(seen.len().saturating_sub(1) as u64) as u16;
    if field.is_array() {
        plan.info.params[2] = field.arity;
    }
    debug!("Pallet for '{}': {} distinct entries", field.name, seen.len());
    Ok(plan)
}

/// Per-record state shared by every field write.
struct WriteContext<'b, 's> {
    bytes: &'b mut [u8],
    slot_start: usize,
    records_len: usize,
    version: Db2Version,
    strings: &'s mut StringTableBuilder,
}

fn write_field(
    field: &FieldDescriptor,
    plan: &FieldPlan,
    value: &Value,
    slot: usize,
    ctx: WriteContext<'_, '_>,
) -> Result<()> {
    let info = &plan.info;
    match &field.storage {
        StorageKind::Inline { .. } => {
            for (element_index, element) in elements(field, value)?.into_iter().enumerate() {
                let bit = info.bit_offset as u64 + element_index as u64 * field.bit_width as u64;
                let raw = match element {
                    Value::Text(text) => {
                        let offset = ctx.strings.intern(text) as u64;
                        let stored = match ctx.version {
                            Db2Version::Wdc1 => offset,
                            Db2Version::Wdc2 => {
                                ctx.records_len as u64 + offset - (ctx.slot_start as u64 + bit / 8)
                            }
                        };
                        u32::try_from(stored).map_err(|_| {
                            Db2Error::unencodable(&field.name, format!("string offset {} exceeds 32 bits", stored))
                        })? as u64
                    }
                    other => field.scalar_to_raw(other)?,
                };
                write_bits(ctx.bytes, bit, field.bit_width, raw);
            }
        }
        StorageKind::BitPacked | StorageKind::Pallet => {
            write_bits(ctx.bytes, info.bit_offset as u64, info.bit_width as u32, plan.per_record[slot]);
        }
        StorageKind::CommonData { .. } => {}
    }
    Ok(())
}
