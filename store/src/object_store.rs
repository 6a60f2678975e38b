//! Object stores, indexes and cursors within a transaction.
//!
//! Issuing an operation fails synchronously with
//! [`EngineError::TransactionInactive`] once the owning transaction has
//! finished, and with [`EngineError::ReadOnly`] for a write in a readonly
//! transaction. Everything else is reported through the returned request.

use std::sync::Arc;

use serde_json::Value;

use larder_types::{Key, KeyPath, Term};

use crate::{EngineError, Request};

/// A store handle bound to one transaction.
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &str;

    fn key_path(&self) -> &KeyPath;

    fn auto_increment(&self) -> bool;

    fn index_names(&self) -> Vec<String>;

    fn index(&self, name: &str) -> Result<Arc<dyn Index>, EngineError>;

    /// Fetch a record. A missing key settles with `None`, not an error.
    fn get(&self, key: &Key) -> Result<Request<Option<Value>>, EngineError>;

    /// Insert or replace a record, settling with its primary key.
    fn put(&self, record: Value) -> Result<Request<Key>, EngineError>;

    /// Delete a record. Deleting a missing key succeeds.
    fn delete(&self, key: &Key) -> Result<Request<()>, EngineError>;

    fn count(&self, term: Option<&Term>) -> Result<Request<u64>, EngineError>;

    /// Open a cursor over records in ascending primary-key order.
    fn open_cursor(&self, term: Option<Term>) -> Result<Arc<dyn Cursor>, EngineError>;
}

/// A secondary index handle bound to one transaction.
pub trait Index: Send + Sync {
    fn name(&self) -> &str;

    fn key_path(&self) -> &KeyPath;

    fn unique(&self) -> bool;

    fn count(&self, term: Option<&Term>) -> Result<Request<u64>, EngineError>;

    /// Open a cursor in ascending (index key, primary key) order.
    fn open_cursor(&self, term: Option<Term>) -> Result<Arc<dyn Cursor>, EngineError>;
}

/// A position in an ordered scan.
pub trait Cursor: Send + Sync {
    /// Step to the next entry; settles with `None` once the scan is exhausted.
    fn advance(&self) -> Result<Request<Option<CursorEntry>>, EngineError>;
}

/// One entry produced by a cursor step.
#[derive(Clone, Debug, PartialEq)]
pub struct CursorEntry {
    /// The key the cursor is ordered by (primary or index key).
    pub key: Key,
    pub primary_key: Key,
    pub value: Value,
}
