//! Pre-built [`tracing::Span`] constructors for session operations.
//!
//! Consistent span names and field sets keep traces from different stores
//! easy to filter and correlate.

use tracing::{debug_span, info_span, Span};

use crate::Operation;

/// Span covering a database open, including any schema upgrade.
pub fn open_span(db: &str, version: u32) -> Span {
    info_span!("db_open", db = %db, version = %version)
}

/// Span covering session construction for one store.
pub fn connect_span(db: &str, store: &str) -> Span {
    info_span!("session_connect", db = %db, store = %store)
}

/// Span covering one public store operation.
pub fn store_op_span(store: &str, op: Operation) -> Span {
    debug_span!("store_op", store = %store, op = %op)
}
