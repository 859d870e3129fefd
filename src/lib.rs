//! # db2-engine
//!
//! Decoder and encoder for DB2 binary table files (WDC1 and WDC2 layouts).
//!
//! Files do not describe their own columns: callers supply a [`Schema`],
//! usually through a [`SchemaRegistry`] loaded from XML definitions. The
//! engine is a pure transformation over in-memory buffers; [`Table::open`]
//! and [`Table::save`] are the only helpers that touch the file system.
pub mod db2;

// Re-export the main types for convenience
pub use db2::{
    codec::strings::StringEncoding,
    decode,
    format::header::{read_header, write_header},
    iter::RecordIter,
    schema::{
        definitions::SchemaRegistry,
        FieldDescriptor,
        FieldType,
        Schema,
        StorageKind,
    },
    types::{
        models::{Db2Header, Db2Version, FieldStorageInfo, HeaderFlags, StorageType},
        value::Value,
    },
    writer::encode,
    Db2Error,
    Db2File,
    Record,
    Result,
    Table,
};
