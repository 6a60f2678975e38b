//! Database-level engine entry point and schema upgrades.

use std::sync::Arc;

use larder_types::KeyPath;

use crate::{Database, EngineError, Request};

/// Structural initialisation callback, run while an open is in progress.
///
/// Receives the upgrade context and the version the database was stored at
/// (`0` for a database that did not exist yet). An error fails the open and
/// leaves the stored version unchanged.
pub type UpgradeHandler =
    Box<dyn FnOnce(&mut dyn Upgrade, u32) -> Result<(), EngineError> + Send>;

/// A storage engine that can open named, versioned databases.
pub trait Engine: Send + Sync {
    /// Open `name` at `version`.
    ///
    /// When the stored version is older than `version`, `on_upgrade` runs
    /// before the open completes. A stored version newer than `version`
    /// fails the request with [`EngineError::Version`].
    fn open(
        &self,
        name: &str,
        version: u32,
        on_upgrade: UpgradeHandler,
    ) -> Request<Arc<dyn Database>>;
}

/// Structural operations permitted during a version upgrade.
pub trait Upgrade {
    fn store_names(&self) -> Vec<String>;

    /// Create an object store. Fails with [`EngineError::Constraint`] if it exists.
    fn create_object_store(
        &mut self,
        name: &str,
        key_path: &KeyPath,
        auto_increment: bool,
    ) -> Result<(), EngineError>;

    fn index_names(&self, store: &str) -> Result<Vec<String>, EngineError>;

    /// Create an index on an existing store. Fails with
    /// [`EngineError::Constraint`] if the index exists.
    fn create_index(
        &mut self,
        store: &str,
        name: &str,
        key_path: &KeyPath,
        unique: bool,
    ) -> Result<(), EngineError>;
}
