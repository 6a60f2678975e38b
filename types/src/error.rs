//! Schema error type shared across crates.

use thiserror::Error;

/// A malformed or incomplete schema, detected before any engine call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema has no database name")]
    MissingName,

    #[error("invalid schema version {0}: versions start at 1")]
    InvalidVersion(u32),

    #[error("schema declares no object stores")]
    NoStores,

    #[error("object store '{0}' is not declared in the schema")]
    UnknownStore(String),

    #[error("invalid key path '{path}': {reason}")]
    InvalidKeyPath { path: String, reason: String },

    #[error("schema parse error: {0}")]
    Parse(String),

    #[error("schema IO error: {0}")]
    Io(String),
}
