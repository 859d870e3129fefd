//! Table schemas: typed field descriptors validated once at construction.
//!
//! A DB2 file does not describe its own columns. The caller supplies a
//! [`Schema`] for the table's layout hash, either built in code or loaded
//! through [`definitions`].

pub mod definitions;

use std::collections::HashMap;

use log::debug;

use super::types::error::{Db2Error, Result};
use super::types::models::Db2Header;
use super::types::value::Value;

/// Scalar type of a field's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    UInt,
    Float,
    Text,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::UInt => "uint",
            FieldType::Float => "float",
            FieldType::Text => "string",
        }
    }
}

/// Where a field's value lives.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageKind {
    /// Fixed position inside every record.
    Inline { bit_offset: u32 },
    /// Packed into the record at a position given by the file's field info.
    BitPacked,
    /// Sparse `(record_id, value)` pairs; rows without an entry take `default`.
    CommonData { default: Value },
    /// Records store an index into this field's palette.
    Pallet,
}

/// Describes one logical column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub value_type: FieldType,
    /// Width of one element in bits. For non-inline storage this bounds the
    /// value domain; the physical width is chosen by the encoder.
    pub bit_width: u32,
    /// Number of elements; 1 for scalars.
    pub arity: u32,
    pub storage: StorageKind,
}

impl FieldDescriptor {
    pub fn new(name: &str, value_type: FieldType, bit_width: u32, storage: StorageKind) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            bit_width,
            arity: 1,
            storage,
        }
    }

    pub fn with_arity(mut self, arity: u32) -> Self {
        self.arity = arity;
        self
    }

    pub fn is_array(&self) -> bool {
        self.arity > 1
    }

    pub fn signed(&self) -> bool {
        self.value_type == FieldType::Int
    }

    /// Builds a scalar value from raw little-endian bits.
    pub fn scalar_from_raw(&self, raw: u64) -> Value {
        match self.value_type {
            FieldType::Int => Value::Int(sign_extend(raw, self.bit_width)),
            FieldType::UInt => Value::UInt(raw),
            FieldType::Float => Value::Float(f32::from_bits(raw as u32)),
            // Text is resolved through the string block, never from raw bits.
            FieldType::Text => Value::UInt(raw),
        }
    }

    /// Converts a scalar value to raw bits, checking it fits `bit_width`.
    pub fn scalar_to_raw(&self, value: &Value) -> Result<u64> {
        let width = self.bit_width;
        match (self.value_type, value) {
            (FieldType::Int, Value::Int(v)) => {
                let (min, max) = signed_range(width);
                if *v < min || *v > max {
                    return Err(Db2Error::unencodable(
                        &self.name,
                        format!("{} does not fit in {} signed bits", v, width),
                    ));
                }
                Ok((*v as u64) & mask(width))
            }
            (FieldType::UInt, Value::UInt(v)) => {
                if *v > mask(width) {
                    return Err(Db2Error::unencodable(
                        &self.name,
                        format!("{} does not fit in {} unsigned bits", v, width),
                    ));
                }
                Ok(*v)
            }
            (FieldType::Float, Value::Float(v)) => Ok(v.to_bits() as u64),
            (expected, other) => Err(Db2Error::unencodable(
                &self.name,
                format!("expected {} value, found {}", expected.name(), other.kind()),
            )),
        }
    }

    /// Validates a value against this field and returns its canonical form.
    ///
    /// Integers of the other signedness are accepted when in range, so a
    /// caller may pass `UInt(5)` to a signed column.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if self.is_array() {
            let items = match value {
                Value::Array(items) => items,
                other => {
                    return Err(Db2Error::unencodable(
                        &self.name,
                        format!("expected array of {}, found {}", self.arity, other.kind()),
                    ));
                }
            };
            if items.len() != self.arity as usize {
                return Err(Db2Error::unencodable(
                    &self.name,
                    format!("expected {} elements, found {}", self.arity, items.len()),
                ));
            }
            let items = items
                .into_iter()
                .map(|item| self.coerce_scalar(item))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Value::Array(items));
        }
        self.coerce_scalar(value)
    }

    fn coerce_scalar(&self, value: Value) -> Result<Value> {
        let value = match (self.value_type, value) {
            (FieldType::Int, Value::UInt(v)) => Value::Int(i64::try_from(v).map_err(|_| {
                Db2Error::unencodable(&self.name, format!("{} exceeds signed range", v))
            })?),
            (FieldType::UInt, Value::Int(v)) => Value::UInt(u64::try_from(v).map_err(|_| {
                Db2Error::unencodable(&self.name, format!("{} is negative", v))
            })?),
            (FieldType::Text, Value::Text(s)) => return Ok(Value::Text(s)),
            (_, other) => other,
        };
        self.scalar_to_raw(&value)?;
        Ok(value)
    }

    /// The zero value used when a record is built without a template.
    pub fn zero_value(&self) -> Value {
        let scalar = match &self.storage {
            StorageKind::CommonData { default } => default.clone(),
            _ => match self.value_type {
                FieldType::Int => Value::Int(0),
                FieldType::UInt => Value::UInt(0),
                FieldType::Float => Value::Float(0.0),
                FieldType::Text => Value::Text(String::new()),
            },
        };
        if self.is_array() {
            Value::Array(vec![scalar; self.arity as usize])
        } else {
            scalar
        }
    }

    fn validate(&self) -> Result<()> {
        let bad = |detail: &str| -> Result<()> {
            Err(Db2Error::InvalidDefinition(format!("field '{}': {}", self.name, detail)))
        };
        if self.name.is_empty() {
            return bad("empty name");
        }
        if self.arity == 0 {
            return bad("arity must be at least 1");
        }
        if self.bit_width == 0 || self.bit_width > 64 {
            return bad("bit width must be within 1..=64");
        }
        if matches!(self.value_type, FieldType::Float | FieldType::Text) && self.bit_width != 32 {
            return bad("float and string fields are 32 bits wide");
        }
        match &self.storage {
            StorageKind::Inline { bit_offset } => {
                if self.value_type == FieldType::Text && bit_offset % 8 != 0 {
                    return bad("string fields must be byte aligned");
                }
                if self.inline_bit_range().is_some_and(|r| r.end > u16::MAX as u64) {
                    return bad("inline field lies beyond the addressable record width");
                }
            }
            StorageKind::BitPacked => {
                if self.is_array() {
                    return bad("bit-packed fields are scalar");
                }
                if matches!(self.value_type, FieldType::Text | FieldType::Float) {
                    return bad("bit-packed fields hold integers");
                }
            }
            StorageKind::CommonData { default } => {
                if self.is_array() {
                    return bad("common data fields are scalar");
                }
                if self.value_type == FieldType::Text || self.bit_width > 32 {
                    return bad("common data values are at most 32 bits and numeric");
                }
                if self.coerce_scalar(default.clone()).is_err() {
                    return bad("default does not fit the field type");
                }
            }
            StorageKind::Pallet => {
                if self.value_type == FieldType::Text || self.bit_width > 32 {
                    return bad("pallet values are at most 32 bits and numeric");
                }
            }
        }
        Ok(())
    }

    /// Bit range occupied by an inline field inside each record.
    pub fn inline_bit_range(&self) -> Option<std::ops::Range<u64>> {
        match self.storage {
            StorageKind::Inline { bit_offset } => {
                let start = bit_offset as u64;
                Some(start..start + self.bit_width as u64 * self.arity as u64)
            }
            _ => None,
        }
    }
}

/// A validated set of field descriptors for one table layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub layout_hash: u32,
    /// Table hash to write on encode; when `None` the decoded file's is kept.
    pub table_hash: Option<u32>,
    fields: Vec<FieldDescriptor>,
    id_field: Option<usize>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Builds and validates a schema. Field names must be unique and inline
    /// bit ranges must not overlap.
    pub fn new(name: &str, layout_hash: u32, fields: Vec<FieldDescriptor>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Db2Error::InvalidDefinition(format!("table '{}' has no fields", name)));
        }
        if fields.len() > i16::MAX as usize {
            return Err(Db2Error::InvalidDefinition(format!("table '{}' has too many fields", name)));
        }

        let mut by_name = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            field.validate()?;
            if by_name.insert(field.name.clone(), index).is_some() {
                return Err(Db2Error::InvalidDefinition(format!(
                    "table '{}' declares field '{}' twice",
                    name, field.name
                )));
            }
        }

        let mut inline: Vec<_> = fields
            .iter()
            .filter_map(|f| f.inline_bit_range().map(|r| (r, &f.name)))
            .collect();
        inline.sort_by_key(|(range, _)| range.start);
        for pair in inline.windows(2) {
            let ((a, a_name), (b, b_name)) = (&pair[0], &pair[1]);
            if b.start < a.end {
                return Err(Db2Error::InvalidDefinition(format!(
                    "inline fields '{}' and '{}' overlap",
                    a_name, b_name
                )));
            }
        }

        debug!("Schema '{}' validated: {} fields, layout hash {:#010x}", name, fields.len(), layout_hash);

        Ok(Self {
            name: name.to_string(),
            layout_hash,
            table_hash: None,
            fields,
            id_field: None,
            by_name,
        })
    }

    pub fn with_table_hash(mut self, table_hash: u32) -> Self {
        self.table_hash = Some(table_hash);
        self
    }

    /// Marks a scalar unsigned field of at most 32 bits as the record id column.
    pub fn with_id_field(mut self, name: &str) -> Result<Self> {
        let index = self.field_index(name)?;
        let field = &self.fields[index];
        let storage_ok = matches!(field.storage, StorageKind::Inline { .. } | StorageKind::BitPacked);
        let type_ok = field.value_type == FieldType::UInt;
        if field.is_array() || !storage_ok || !type_ok || field.bit_width > 32 {
            return Err(Db2Error::InvalidDefinition(format!(
                "field '{}' cannot be an id column",
                name
            )));
        }
        self.id_field = Some(index);
        Ok(self)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn id_field(&self) -> Option<usize> {
        self.id_field
    }

    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Db2Error::UnknownField(name.to_string()))
    }

    pub fn field(&self, name: &str) -> Result<&FieldDescriptor> {
        Ok(&self.fields[self.field_index(name)?])
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// End of the inline region in bits.
    pub fn inline_bits(&self) -> u64 {
        self.fields
            .iter()
            .filter_map(|f| f.inline_bit_range())
            .map(|r| r.end)
            .max()
            .unwrap_or(0)
    }

    /// Checks that this schema describes the file behind `header`.
    pub fn check_header(&self, header: &Db2Header) -> Result<()> {
        let mismatch = |detail: String| Db2Error::SchemaNotFound {
            layout_hash: header.layout_hash,
            detail,
        };
        if header.layout_hash != self.layout_hash {
            return Err(mismatch(format!(
                "schema '{}' declares {:#010x}",
                self.name, self.layout_hash
            )));
        }
        if header.field_count as usize != self.fields.len() {
            return Err(mismatch(format!(
                "file has {} fields, schema '{}' has {}",
                header.field_count,
                self.name,
                self.fields.len()
            )));
        }
        let schema_id = self.id_field.map_or(-1, |i| i as i16);
        if header.id_field_index != schema_id {
            return Err(mismatch(format!(
                "file id column {}, schema '{}' id column {}",
                header.id_field_index, self.name, schema_id
            )));
        }
        Ok(())
    }
}

/// Sign-extends the low `width` bits of `raw`.
pub fn sign_extend(raw: u64, width: u32) -> i64 {
    if width == 0 {
        return 0;
    }
    if width >= 64 {
        return raw as i64;
    }
    let shift = 64 - width;
    ((raw << shift) as i64) >> shift
}

/// Mask covering the low `width` bits.
pub fn mask(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

fn signed_range(width: u32) -> (i64, i64) {
    if width >= 64 {
        (i64::MIN, i64::MAX)
    } else {
        let half = 1i64 << (width - 1);
        (-half, half - 1)
    }
}
