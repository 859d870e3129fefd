//! Sequential access to decoded records.
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use db2_engine::{Db2File, SchemaRegistry};
//! # let registry = SchemaRegistry::load("definitions.xml").unwrap();
//! # let bytes = std::fs::read("Spell.db2").unwrap();
//! # let header = db2_engine::read_header(&bytes).unwrap();
//! let file = Db2File::from_parts(&bytes, header.clone(), registry.resolve(&header).unwrap()).unwrap();
//! for result in file.records() {
//!     let record = result.unwrap();
//!     println!("{}: {:?}", record.id(), record.values());
//! }
//! ```

use super::reader::Db2File;
use super::table::Record;
use super::types::error::Result;

/// Iterator over the records of a [`Db2File`] in slot order.
///
/// Each record is decoded when it is reached. Created by
/// [`Db2File::records()`](crate::Db2File::records).
pub struct RecordIter<'f, 'a> {
    file: &'f Db2File<'a>,
    slot: usize,
}

impl<'f, 'a> RecordIter<'f, 'a> {
    pub(super) fn new(file: &'f Db2File<'a>) -> Self {
        Self { file, slot: 0 }
    }
}

impl Iterator for RecordIter<'_, '_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.slot >= self.file.len() {
            return None;
        }
        let record = self.file.record_at(self.slot);
        self.slot += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.file.len().saturating_sub(self.slot);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RecordIter<'_, '_> {}
