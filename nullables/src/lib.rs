//! Nullable infrastructure for deterministic testing.
//!
//! [`NullEngine`] implements the `larder-store` engine traits entirely in
//! memory. It never touches the filesystem and reproduces the engine
//! behaviour that matters to transaction-lease management:
//! - request notifications arrive in issue order, from a spawned task when
//!   a tokio runtime is running and inline otherwise;
//! - a transaction commits by itself once it goes idle, or stays open
//!   until [`NullEngine::commit_idle`] when configured with
//!   [`AutoCommit::Manual`];
//! - a failed request aborts its transaction and rolls back its writes.
//!
//! Writes apply to the shared records immediately and are undone on abort;
//! there is no isolation between concurrent transactions.
//!
//! Usage: swap a real engine for a `NullEngine` in tests.

pub mod config;
pub mod engine;
pub mod error;
pub mod object_store;
pub mod records;
pub mod transaction;

pub use config::{AutoCommit, NullEngineConfig};
pub use engine::NullEngine;
pub use error::NullEngineError;
