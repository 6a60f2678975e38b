use thiserror::Error;

/// An error reported by the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transaction is no longer active")]
    TransactionInactive,

    #[error("write attempted in a readonly transaction")]
    ReadOnly,

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("stored version {stored} is newer than requested version {requested}")]
    Version { stored: u32, requested: u32 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transaction was aborted")]
    Aborted,

    #[error("request was dropped before it settled")]
    Abandoned,
}
