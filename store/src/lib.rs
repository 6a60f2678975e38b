//! Abstract storage-engine traits for Larder.
//!
//! The engine is an IndexedDB-style substrate: versioned databases of named
//! object stores, reachable only through short-lived transactions, reporting
//! every outcome through callbacks. Every engine backend (a browser binding,
//! the in-memory nullable engine) implements these traits; the rest of the
//! workspace depends only on them.

pub mod database;
pub mod engine;
pub mod error;
pub mod object_store;
pub mod request;

pub use database::{Database, FinishObserver, Transaction, TxOutcome};
pub use engine::{Engine, Upgrade, UpgradeHandler};
pub use error::EngineError;
pub use object_store::{Cursor, CursorEntry, Index, ObjectStore};
pub use request::{request, Request, Responder};
