//! Custom error types for the db2-engine crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum Db2Error {
    /// An error originating from I/O operations (file helpers and the CLI only).
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The header magic is unknown, the header is cut short, or a declared
    /// block would read past the end of the input.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// No schema matches the file's layout hash or field count.
    #[error("No schema found for layout hash {layout_hash:#010x} ({detail})")]
    SchemaNotFound { layout_hash: u32, detail: String },

    /// A resolved offset or index lies outside the block it points into.
    #[error("Field '{field}' out of range: {detail}")]
    FieldOutOfRange { field: String, detail: String },

    /// Fewer bytes remain than one record slot needs.
    #[error("Record {slot} truncated: expected {expected} bytes, but found {found} bytes")]
    TruncatedRecord {
        slot: usize,
        expected: usize,
        found: usize,
    },

    /// A value cannot be represented by its field's type, width or arity.
    #[error("Unencodable value for field '{field}': {detail}")]
    UnencodableValue { field: String, detail: String },

    /// A schema definition file or descriptor list is structurally invalid.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// The schema has no field with this name.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// No record with this id exists in the table.
    #[error("Record {0} not found")]
    RecordNotFound(u32),

    /// Two records share an id where ids must be unique.
    #[error("Duplicate record id {0}")]
    DuplicateId(u32),
}

impl Db2Error {
    pub(crate) fn out_of_range(field: &str, detail: impl Into<String>) -> Self {
        Db2Error::FieldOutOfRange {
            field: field.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn unencodable(field: &str, detail: impl Into<String>) -> Self {
        Db2Error::UnencodableValue {
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}

/// A convenience `Result` type alias using the crate's `Db2Error` type.
pub type Result<T> = std::result::Result<T, Db2Error>;
