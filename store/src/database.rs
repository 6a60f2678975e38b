//! Open databases and their transactions.

use std::sync::Arc;

use larder_types::Mode;

use crate::{EngineError, ObjectStore};

/// How a transaction ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    /// Committed after its last request settled.
    Complete,
    /// Aborted explicitly.
    Aborted,
    /// Aborted because a request failed.
    Failed(String),
}

/// Callback fired once when a transaction completes, aborts or fails.
pub type FinishObserver = Box<dyn FnOnce(TxOutcome) + Send>;

/// An open connection to one versioned database.
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    fn store_names(&self) -> Vec<String>;

    /// Begin a transaction over `stores` in `mode`.
    ///
    /// Fails with [`EngineError::NotFound`] for an undeclared store and
    /// [`EngineError::InvalidState`] once the connection is closed.
    fn transaction(&self, stores: &[&str], mode: Mode)
        -> Result<Arc<dyn Transaction>, EngineError>;

    /// Close the connection. Transactions already begun run to completion.
    fn close(&self);
}

/// A short-lived transaction. It finishes on its own once it goes idle.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> Mode;

    /// A handle to one of the stores in this transaction's scope.
    fn object_store(&self, name: &str) -> Result<Arc<dyn ObjectStore>, EngineError>;

    /// Register a completion/abort/error observer.
    ///
    /// Observers registered after the transaction finished run immediately.
    fn on_finish(&self, observer: FinishObserver);

    fn abort(&self);

    fn is_finished(&self) -> bool;
}
