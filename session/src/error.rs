use std::fmt;

use thiserror::Error;

use larder_store::EngineError;
use larder_types::{Key, SchemaError, Term};

/// A public store operation, named in error messages and spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Metadata,
    Read,
    ReadMany,
    Write,
    Remove,
    OpenCursor,
    CursorStep,
    Count,
    CountByIndex,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Read => "read",
            Self::ReadMany => "read_many",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::OpenCursor => "open_cursor",
            Self::CursorStep => "cursor_step",
            Self::Count => "count",
            Self::CountByIndex => "count_by_index",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failed operation was aimed at.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Store,
    Key(Key),
    Keys(usize),
    /// A record whose primary key could not be read.
    KeylessRecord,
    Range(Option<Term>),
    Index { name: String, term: Option<Term> },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => Ok(()),
            Self::Key(key) => write!(f, " for key {key}"),
            Self::Keys(count) => write!(f, " for {count} keys"),
            Self::KeylessRecord => write!(f, " for a record without a key"),
            Self::Range(Some(term)) => write!(f, " over {term}"),
            Self::Range(None) => write!(f, " over all keys"),
            Self::Index { name, term: Some(term) } => write!(f, " on index '{name}' over {term}"),
            Self::Index { name, term: None } => write!(f, " on index '{name}'"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to open database '{name}' at version {version}: {source}")]
    Open {
        name: String,
        version: u32,
        #[source]
        source: EngineError,
    },

    #[error("{op} on store '{store}'{target} failed: {source}")]
    Engine {
        op: Operation,
        store: String,
        target: Target,
        #[source]
        source: EngineError,
    },

    #[error("cursor on store '{store}' stepped after its transaction closed")]
    StaleCursor { store: String },

    #[error("session for store '{store}' is closed")]
    SessionClosed { store: String },

    #[error("config error: {0}")]
    Config(String),
}

impl SessionError {
    /// The engine's own error, when the engine reported the failure.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Open { source, .. } | Self::Engine { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_name_operation_store_and_key() {
        let err = SessionError::Engine {
            op: Operation::Read,
            store: "fruit".into(),
            target: Target::Key(Key::from("apple")),
            source: EngineError::TransactionInactive,
        };
        assert_eq!(
            err.to_string(),
            "read on store 'fruit' for key \"apple\" failed: transaction is no longer active"
        );
        assert_eq!(err.engine_error(), Some(&EngineError::TransactionInactive));
    }

    #[test]
    fn index_targets_render_term() {
        let err = SessionError::Engine {
            op: Operation::CountByIndex,
            store: "fruit".into(),
            target: Target::Index {
                name: "size".into(),
                term: Some(Term::from("big")),
            },
            source: EngineError::NotFound("index 'size'".into()),
        };
        assert_eq!(
            err.to_string(),
            "count_by_index on store 'fruit' on index 'size' over = \"big\" failed: not found: index 'size'"
        );
    }

    #[test]
    fn store_level_target_adds_nothing() {
        let err = SessionError::Engine {
            op: Operation::Metadata,
            store: "fruit".into(),
            target: Target::Store,
            source: EngineError::Aborted,
        };
        assert_eq!(
            err.to_string(),
            "metadata on store 'fruit' failed: transaction was aborted"
        );
    }

    #[test]
    fn schema_errors_convert() {
        let err: SessionError = SchemaError::MissingName.into();
        assert!(matches!(err, SessionError::Schema(SchemaError::MissingName)));
        assert!(err.engine_error().is_none());
    }
}
