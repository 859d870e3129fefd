#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use db2_engine::{FieldDescriptor, FieldType, Schema, SchemaRegistry, StorageKind, Value};
use std::sync::Arc;

pub const SIMPLE_LAYOUT: u32 = 0x1234_5678;
pub const NAMED_LAYOUT: u32 = 0x0BAD_F00D;

/// Hand-assembled DB2 file. Block sizes are derived from the byte vectors;
/// counts are explicit so tests can make them disagree.
pub struct Fixture {
    pub magic: [u8; 4],
    pub record_count: u32,
    pub field_count: u32,
    pub record_size: u32,
    pub table_hash: u32,
    pub layout_hash: u32,
    pub min_id: u32,
    pub max_id: u32,
    pub locale: u32,
    pub flags: u16,
    pub id_field_index: i16,
    pub bitpacked_data_offset: u32,
    pub field_info: Vec<u8>,
    pub records: Vec<u8>,
    pub strings: Vec<u8>,
    pub pallet: Vec<u8>,
    pub common: Vec<u8>,
    pub id_list: Vec<u8>,
}

impl Fixture {
    pub fn new(layout_hash: u32, field_count: u32, record_size: u32) -> Self {
        Self {
            magic: *b"WDC2",
            record_count: 0,
            field_count,
            record_size,
            table_hash: 0xAABB_CCDD,
            layout_hash,
            min_id: 0,
            max_id: 0,
            locale: 0x100,
            flags: 0,
            id_field_index: -1,
            bitpacked_data_offset: 0,
            field_info: Vec::new(),
            records: Vec::new(),
            strings: Vec::new(),
            pallet: Vec::new(),
            common: Vec::new(),
            id_list: Vec::new(),
        }
    }

    /// Appends one record made of little-endian u32 words.
    pub fn push_words(&mut self, words: &[u32]) {
        for word in words {
            self.records.write_u32::<LittleEndian>(*word).unwrap();
        }
        self.record_count += 1;
    }

    /// Appends one raw record.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.records.extend_from_slice(bytes);
        self.record_count += 1;
    }

    pub fn field_info(
        &mut self,
        bit_offset: u16,
        bit_width: u16,
        additional_data_size: u32,
        storage_type: u32,
        params: [u32; 3],
    ) {
        let out = &mut self.field_info;
        out.write_u16::<LittleEndian>(bit_offset).unwrap();
        out.write_u16::<LittleEndian>(bit_width).unwrap();
        out.write_u32::<LittleEndian>(additional_data_size).unwrap();
        out.write_u32::<LittleEndian>(storage_type).unwrap();
        for p in params {
            out.write_u32::<LittleEndian>(p).unwrap();
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.magic);
        for word in [
            self.record_count,
            self.field_count,
            self.record_size,
            self.strings.len() as u32,
            self.table_hash,
            self.layout_hash,
            self.min_id,
            self.max_id,
            self.locale,
        ] {
            out.write_u32::<LittleEndian>(word).unwrap();
        }
        out.write_u16::<LittleEndian>(self.flags).unwrap();
        out.write_i16::<LittleEndian>(self.id_field_index).unwrap();
        for word in [
            self.field_count,
            self.bitpacked_data_offset,
            0,
            self.field_info.len() as u32,
            self.common.len() as u32,
            self.pallet.len() as u32,
            self.id_list.len() as u32,
        ] {
            out.write_u32::<LittleEndian>(word).unwrap();
        }
        assert_eq!(out.len(), 72, "fixture header size");
        out.extend_from_slice(&self.field_info);
        out.extend_from_slice(&self.records);
        out.extend_from_slice(&self.strings);
        out.extend_from_slice(&self.pallet);
        out.extend_from_slice(&self.common);
        out.extend_from_slice(&self.id_list);
        out
    }
}

/// `ID` (uint32, id column) followed by `value` (int32).
pub fn simple_schema() -> Arc<Schema> {
    let schema = Schema::new(
        "Simple",
        SIMPLE_LAYOUT,
        vec![
            FieldDescriptor::new("ID", FieldType::UInt, 32, StorageKind::Inline { bit_offset: 0 }),
            FieldDescriptor::new("value", FieldType::Int, 32, StorageKind::Inline { bit_offset: 32 }),
        ],
    )
    .expect("simple schema")
    .with_id_field("ID")
    .expect("id field");
    Arc::new(schema)
}

/// The two-record file used by the basic decode scenario: `(100, 5), (101, 9)`.
pub fn simple_fixture() -> Fixture {
    let mut fixture = Fixture::new(SIMPLE_LAYOUT, 2, 8);
    fixture.id_field_index = 0;
    fixture.min_id = 100;
    fixture.max_id = 101;
    fixture.push_words(&[100, 5]);
    fixture.push_words(&[101, 9]);
    fixture
}

/// `ID` (uint32, id column) followed by `Name` (string).
pub fn named_schema() -> Arc<Schema> {
    let schema = Schema::new(
        "Named",
        NAMED_LAYOUT,
        vec![
            FieldDescriptor::new("ID", FieldType::UInt, 32, StorageKind::Inline { bit_offset: 0 }),
            FieldDescriptor::new("Name", FieldType::Text, 32, StorageKind::Inline { bit_offset: 32 }),
        ],
    )
    .expect("named schema")
    .with_id_field("ID")
    .expect("id field");
    Arc::new(schema)
}

/// A schema that exercises every storage kind.
pub fn rich_schema() -> Arc<Schema> {
    let schema = Schema::new(
        "Rich",
        0xC0FF_EE00,
        vec![
            FieldDescriptor::new("ID", FieldType::UInt, 32, StorageKind::Inline { bit_offset: 0 }),
            FieldDescriptor::new("Name", FieldType::Text, 32, StorageKind::Inline { bit_offset: 32 }),
            FieldDescriptor::new("Scale", FieldType::Float, 32, StorageKind::Inline { bit_offset: 64 }),
            FieldDescriptor::new("Tags", FieldType::Text, 32, StorageKind::Inline { bit_offset: 96 })
                .with_arity(2),
            FieldDescriptor::new("Delta", FieldType::Int, 16, StorageKind::BitPacked),
            FieldDescriptor::new("Flags", FieldType::UInt, 32, StorageKind::BitPacked),
            FieldDescriptor::new(
                "School",
                FieldType::UInt,
                32,
                StorageKind::CommonData {
                    default: Value::UInt(7),
                },
            ),
            FieldDescriptor::new("Color", FieldType::Int, 32, StorageKind::Pallet),
            FieldDescriptor::new("Icons", FieldType::UInt, 32, StorageKind::Pallet).with_arity(3),
        ],
    )
    .expect("rich schema")
    .with_table_hash(0x5151_5151)
    .with_id_field("ID")
    .expect("id field");
    Arc::new(schema)
}

pub fn registry_with(schemas: &[&Arc<Schema>]) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for schema in schemas {
        registry.insert(Schema::clone(schema));
    }
    registry
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
