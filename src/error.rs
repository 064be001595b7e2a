use thiserror::Error;

use crate::record::Field;

/// A named or canonical blob was located but could not be turned into a tree.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("no `{name}` declaration in document")]
    Missing { name: String },
    #[error("`{name}` declaration has no object literal after `=`")]
    NoLiteral { name: String },
    #[error("`{name}` did not parse after {attempts} candidate spans: {source}")]
    Unparseable {
        name: String,
        attempts: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// An individual extractor gave up. The field degrades to null.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("{field}: expected {expected} at `{path}`, found {found}")]
    Shape {
        field: Field,
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{field}: value `{raw}` is not usable")]
    Invalid { field: Field, raw: String },
}

/// The interactive phone reveal did not produce a number.
#[derive(Debug, Error)]
pub enum RevealError {
    #[error("no contact-reveal control on page")]
    NoControl,
    #[error("surface refused action: {0}")]
    Surface(String),
    #[error("no phone-shaped element within {waited_ms} ms")]
    Timeout { waited_ms: u64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store json at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Short JSON type name for shape errors.
pub fn kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
