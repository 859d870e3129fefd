//! In-memory tables: the decoded form that callers inspect and edit.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use super::format::header::read_header;
use super::reader::Db2File;
use super::schema::definitions::SchemaRegistry;
use super::schema::Schema;
use super::types::error::{Db2Error, Result};
use super::types::models::{Db2Header, Db2Version, HeaderFlags};
use super::types::value::Value;
use super::writer;

/// One decoded row: its id plus one value per schema field, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: u32,
    values: Vec<Value>,
}

impl Record {
    pub(crate) fn new(id: u32, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// A decoded table: header, schema and records keyed by unique id.
///
/// Tables whose schema has an id column keep records in ascending id
/// order; other tables keep insertion order. There is no internal locking.
#[derive(Debug, Clone)]
pub struct Table {
    header: Db2Header,
    schema: Arc<Schema>,
    records: Vec<Record>,
}

impl PartialEq for Table {
    /// Tables are equal when they hold the same records under the same
    /// schema. Header sizes and widths are encoding details and are ignored.
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.schema, &other.schema) || self.schema == other.schema)
            && self.records == other.records
    }
}

impl Table {
    /// Creates an empty WDC2 table for `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        let field_count = schema.fields().len() as u32;
        let header = Db2Header {
            version: Db2Version::Wdc2,
            record_count: 0,
            field_count,
            record_size: 0,
            string_table_size: 0,
            table_hash: schema.table_hash.unwrap_or(0),
            layout_hash: schema.layout_hash,
            min_id: 0,
            max_id: 0,
            locale: 0,
            flags: HeaderFlags::default(),
            id_field_index: schema.id_field().map_or(-1, |i| i as i16),
            total_field_count: field_count,
            bitpacked_data_offset: 0,
            lookup_column_count: 0,
            field_storage_info_size: 0,
            common_data_size: 0,
            pallet_data_size: 0,
            id_list_size: 0,
        };
        Self {
            header,
            schema,
            records: Vec::new(),
        }
    }

    /// Decodes `bytes`, picking the schema from `registry` by layout hash.
    pub fn decode(bytes: &[u8], registry: &SchemaRegistry) -> Result<Self> {
        let header = read_header(bytes)?;
        let schema = registry.resolve(&header)?;
        Db2File::from_parts(bytes, header, schema)?.into_table()
    }

    /// Reads a whole file and decodes it.
    pub fn open(path: impl AsRef<Path>, registry: &SchemaRegistry) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening DB2 file: {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes, registry)
    }

    pub(crate) fn from_decoded(header: Db2Header, schema: Arc<Schema>, mut records: Vec<Record>) -> Result<Self> {
        if schema.id_field().is_some() {
            records.sort_by_key(Record::id);
        }
        let mut seen = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().find(|r| !seen.insert(r.id)) {
            return Err(Db2Error::DuplicateId(dup.id));
        }
        Ok(Self {
            header,
            schema,
            records,
        })
    }

    /// Serializes the table to DB2 bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        writer::encode(self)
    }

    /// Encodes the table and writes it to `path`.
    ///
    /// Nothing is written if encoding fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode()?;
        std::fs::write(path, &bytes)?;
        info!("Saved {} records ({} bytes) to {}", self.records.len(), bytes.len(), path.display());
        Ok(())
    }

    /// Header as decoded, or as created for a new table.
    pub fn header(&self) -> &Db2Header {
        &self.header
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.schema.field_names()
    }

    /// Records in table order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.records.iter().map(Record::id)
    }

    pub fn record(&self, id: u32) -> Option<&Record> {
        self.position(id).map(|pos| &self.records[pos])
    }

    pub fn contains(&self, id: u32) -> bool {
        self.position(id).is_some()
    }

    /// Returns the value of field `name` in record `id`.
    pub fn get(&self, id: u32, name: &str) -> Result<&Value> {
        let index = self.schema.field_index(name)?;
        let record = self.record(id).ok_or(Db2Error::RecordNotFound(id))?;
        Ok(&record.values[index])
    }

    /// Replaces the value of field `name` in record `id`.
    ///
    /// The value is checked against the field's type, width and arity.
    /// Writing the id column re-keys the record.
    pub fn set(&mut self, id: u32, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.schema.field_index(name)?;
        let field = &self.schema.fields()[index];
        let value = field.coerce(value.into())?;
        let pos = self.position(id).ok_or(Db2Error::RecordNotFound(id))?;

        if Some(index) == self.schema.id_field() {
            let new_id = value
                .as_u32()
                .ok_or_else(|| Db2Error::unencodable(&field.name, format!("{} is not a valid id", value)))?;
            if new_id != id {
                if self.contains(new_id) {
                    return Err(Db2Error::DuplicateId(new_id));
                }
                let mut record = self.records.remove(pos);
                record.id = new_id;
                record.values[index] = value;
                self.insert(record);
                debug!("Record {} re-keyed to {}", id, new_id);
                return Ok(());
            }
        }

        self.records[pos].values[index] = value;
        Ok(())
    }

    /// Adds record `new_id` as a copy of record `template_id`.
    pub fn add_record(&mut self, new_id: u32, template_id: u32) -> Result<()> {
        let template = self
            .record(template_id)
            .ok_or(Db2Error::RecordNotFound(template_id))?
            .values
            .clone();
        self.insert_values(new_id, template)
    }

    /// Adds record `new_id` with every field at its zero value (or its
    /// common-data default).
    pub fn add_default_record(&mut self, new_id: u32) -> Result<()> {
        let values = self.schema.fields().iter().map(|f| f.zero_value()).collect();
        self.insert_values(new_id, values)
    }

    /// Appends a copy of the last record with id `last id + 1` and returns
    /// the new id. An empty table gets a default record with id 1.
    pub fn append_record(&mut self) -> Result<u32> {
        match self.records.last() {
            Some(last) => {
                let new_id = last
                    .id
                    .checked_add(1)
                    .ok_or_else(|| Db2Error::unencodable("id", "id space exhausted"))?;
                self.add_record(new_id, last.id)?;
                Ok(new_id)
            }
            None => {
                self.add_default_record(1)?;
                Ok(1)
            }
        }
    }

    /// Removes and returns record `id`.
    pub fn remove_record(&mut self, id: u32) -> Result<Record> {
        let pos = self.position(id).ok_or(Db2Error::RecordNotFound(id))?;
        Ok(self.records.remove(pos))
    }

    fn insert_values(&mut self, new_id: u32, mut values: Vec<Value>) -> Result<()> {
        if self.contains(new_id) {
            return Err(Db2Error::DuplicateId(new_id));
        }
        if let Some(index) = self.schema.id_field() {
            let field = &self.schema.fields()[index];
            values[index] = field.coerce(Value::UInt(new_id as u64))?;
        }
        self.insert(Record::new(new_id, values));
        debug!("Record {} added ({} records)", new_id, self.records.len());
        Ok(())
    }

    fn insert(&mut self, record: Record) {
        if self.schema.id_field().is_some() {
            let pos = self.records.partition_point(|r| r.id < record.id);
            self.records.insert(pos, record);
        } else {
            self.records.push(record);
        }
    }

    fn position(&self, id: u32) -> Option<usize> {
        if self.schema.id_field().is_some() {
            self.records.binary_search_by_key(&id, Record::id).ok()
        } else {
            self.records.iter().position(|r| r.id == id)
        }
    }
}
