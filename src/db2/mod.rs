//! DB2 table engine: header reader, record decoder and record encoder.
//!
//! ```text
//! bytes ─► format::header ─► (header, schema) ─► reader::Db2File ─► Table
//!                                                                   │ edits
//! bytes ◄──────────────────── writer::encode ◄──────────────────────┘
//! ```

pub mod codec;
pub mod format;
pub mod iter;
pub mod reader;
pub mod schema;
pub mod table;
pub mod types;
pub mod writer;

pub use reader::{decode, Db2File};
pub use table::{Record, Table};
pub use types::error::{Db2Error, Result};
