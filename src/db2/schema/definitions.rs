//! Loading schemas from XML definition files and resolving them by layout hash.
//!
//! # Definition Format
//! ```text
//! <definitions>
//!   <table name="Spell" layoutHash="0x12345678" tableHash="0x9" idField="ID">
//!     <field name="ID" type="uint" bits="32" storage="inline" offset="0"/>
//!     <field name="Name" type="string" storage="inline" offset="32"/>
//!     <field name="Flags" type="int" bits="16" storage="bitpacked"/>
//!     <field name="School" type="uint" bits="32" storage="common" default="0"/>
//!     <field name="Icon" type="uint" bits="32" storage="pallet" arity="2"/>
//!   </table>
//! </definitions>
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{FieldDescriptor, FieldType, Schema, StorageKind};
use crate::db2::types::error::{Db2Error, Result};
use crate::db2::types::models::Db2Header;
use crate::db2::types::value::Value;

/// Schemas available to the decoder, keyed by layout hash.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    by_layout: HashMap<u32, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous one with the same layout hash.
    pub fn insert(&mut self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        self.by_layout.insert(schema.layout_hash, Arc::clone(&schema));
        schema
    }

    pub fn len(&self) -> usize {
        self.by_layout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_layout.is_empty()
    }

    pub fn get(&self, layout_hash: u32) -> Option<Arc<Schema>> {
        self.by_layout.get(&layout_hash).cloned()
    }

    /// Finds the schema for a parsed header and checks that it matches.
    pub fn resolve(&self, header: &Db2Header) -> Result<Arc<Schema>> {
        let schema = self.get(header.layout_hash).ok_or_else(|| Db2Error::SchemaNotFound {
            layout_hash: header.layout_hash,
            detail: format!("none of {} registered schemas matches", self.len()),
        })?;
        schema.check_header(header)?;
        Ok(schema)
    }

    /// Parses every `<table>` in an XML definition document.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut registry = Self::new();
        for schema in parse_definitions(xml)? {
            registry.insert(schema);
        }
        Ok(registry)
    }

    /// Reads and parses an XML definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading definitions: {}", path.display());
        let xml = std::fs::read_to_string(path)?;
        Self::from_xml(&xml)
    }
}

/// A `<table>` element being collected.
struct PendingTable {
    attrs: HashMap<String, String>,
    fields: Vec<FieldDescriptor>,
}

/// Parses all table definitions in document order.
pub fn parse_definitions(xml: &str) -> Result<Vec<Schema>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut schemas = Vec::new();
    let mut pending: Option<PendingTable> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"table" => {
                pending = Some(PendingTable {
                    attrs: attributes(&e)?,
                    fields: Vec::new(),
                });
            }
            Ok(Event::Empty(e) | Event::Start(e)) if e.name().as_ref() == b"field" => {
                let table = pending.as_mut().ok_or_else(|| {
                    Db2Error::InvalidDefinition("<field> outside of <table>".to_string())
                })?;
                table.fields.push(build_field(&attributes(&e)?)?);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"table" => {
                let table = pending.take().ok_or_else(|| {
                    Db2Error::InvalidDefinition("unbalanced </table>".to_string())
                })?;
                schemas.push(build_schema(table)?);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Db2Error::InvalidDefinition(format!(
                    "Failed to read definition XML: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if pending.is_some() {
        return Err(Db2Error::InvalidDefinition("unterminated <table>".to_string()));
    }
    debug!("Parsed {} table definitions", schemas.len());
    Ok(schemas)
}

fn attributes(e: &BytesStart) -> Result<HashMap<String, String>> {
    e.attributes()
        .map(|attr_result| {
            let attr = attr_result.map_err(|e| {
                Db2Error::InvalidDefinition(format!("Failed to parse XML attribute: {}", e))
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| Db2Error::InvalidDefinition(format!("Failed to decode XML value: {}", e)))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn build_schema(table: PendingTable) -> Result<Schema> {
    let attrs = &table.attrs;
    let name = required(attrs, "name", "table")?;
    let layout_hash = parse_u32(required(attrs, "layoutHash", name)?, "layoutHash")?;

    let mut schema = Schema::new(name, layout_hash, table.fields)?;
    if let Some(hash) = attrs.get("tableHash") {
        schema = schema.with_table_hash(parse_u32(hash, "tableHash")?);
    }
    if let Some(id_field) = attrs.get("idField") {
        schema = schema.with_id_field(id_field)?;
    }
    Ok(schema)
}

fn build_field(attrs: &HashMap<String, String>) -> Result<FieldDescriptor> {
    let name = required(attrs, "name", "field")?;
    let value_type = match required(attrs, "type", name)? {
        "int" => FieldType::Int,
        "uint" => FieldType::UInt,
        "float" => FieldType::Float,
        "string" => FieldType::Text,
        other => {
            return Err(Db2Error::InvalidDefinition(format!(
                "field '{}': unknown type '{}'",
                name, other
            )));
        }
    };
    let bit_width = match attrs.get("bits") {
        Some(bits) => parse_u32(bits, "bits")?,
        None => 32,
    };
    let arity = match attrs.get("arity") {
        Some(arity) => parse_u32(arity, "arity")?,
        None => 1,
    };

    let storage = match attrs.get("storage").map(String::as_str).unwrap_or("inline") {
        "inline" => StorageKind::Inline {
            bit_offset: parse_u32(required(attrs, "offset", name)?, "offset")?,
        },
        "bitpacked" => StorageKind::BitPacked,
        "pallet" => StorageKind::Pallet,
        "common" => {
            let raw = attrs.get("default").map(String::as_str).unwrap_or("0");
            StorageKind::CommonData {
                default: parse_default(raw, value_type, name)?,
            }
        }
        other => {
            return Err(Db2Error::InvalidDefinition(format!(
                "field '{}': unknown storage '{}'",
                name, other
            )));
        }
    };

    Ok(FieldDescriptor::new(name, value_type, bit_width, storage).with_arity(arity))
}

fn parse_default(raw: &str, value_type: FieldType, field: &str) -> Result<Value> {
    let invalid = || Db2Error::InvalidDefinition(format!("field '{}': invalid default '{}'", field, raw));
    match value_type {
        FieldType::Int => raw.parse().map(Value::Int).map_err(|_| invalid()),
        FieldType::UInt => parse_u32(raw, "default").map(|v| Value::UInt(v as u64)),
        FieldType::Float => raw.parse().map(Value::Float).map_err(|_| invalid()),
        FieldType::Text => Err(invalid()),
    }
}

fn required<'a>(attrs: &'a HashMap<String, String>, key: &str, owner: &str) -> Result<&'a str> {
    attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Db2Error::InvalidDefinition(format!("'{}' is missing attribute '{}'", owner, key)))
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
fn parse_u32(raw: &str, what: &str) -> Result<u32> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| Db2Error::InvalidDefinition(format!("Invalid {} '{}': {}", what, raw, e)))
}
