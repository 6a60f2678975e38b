//! Long-lived store sessions over short-lived engine transactions.
//!
//! Engine transactions close on their own as soon as the caller goes idle.
//! A [`StoreSession`] hides that: it holds a lease on the current
//! transaction, reuses it while it is still open in a compatible mode, and
//! opens a fresh one only when the lease is missing, closed, or readonly
//! while a write is requested.
//!
//! - [`gateway`] turns engine callbacks into awaitable results and opens
//!   (and initialises) databases from a [`Schema`](larder_types::Schema).
//! - [`session`] is the lease manager and the public store API.
//! - [`cursor`] exposes ordered scans as lazy, single-pass sequences.

pub mod config;
pub mod cursor;
pub mod error;
pub mod gateway;
pub mod lease;
pub mod session;
pub mod tracing_spans;

pub use config::SessionConfig;
pub use cursor::Cursor;
pub use error::{Operation, SessionError, Target};
pub use gateway::{await_request, open_database, Connection};
pub use lease::LeaseStatus;
pub use session::{LeaseStats, StoreMetadata, StoreSession};

pub use larder_store::CursorEntry;
pub use larder_types::{Key, KeyPath, Mode, Schema, SchemaError, Term};
