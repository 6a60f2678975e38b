//! Fundamental types for Larder.
//!
//! This crate defines the vocabulary shared across every other crate in the
//! workspace: engine keys, key paths, key ranges (terms), transaction access
//! modes, and the database schema consumed when a connection is opened.

pub mod error;
pub mod key;
pub mod key_path;
pub mod mode;
pub mod schema;
pub mod term;

pub use error::SchemaError;
pub use key::Key;
pub use key_path::KeyPath;
pub use mode::Mode;
pub use schema::{IndexOptions, IndexSchema, Schema, StoreOptions, StoreSchema};
pub use term::Term;
