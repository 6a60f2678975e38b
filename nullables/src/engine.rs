//! The null engine and its database connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tracing::{debug, info};

use larder_store::{
    request, Database, Engine, EngineError, Request, Transaction, Upgrade, UpgradeHandler,
};
use larder_types::{KeyPath, Mode};
use larder_utils::lock;

use crate::records::{DbState, IndexDef, StoreData};
use crate::transaction::NullTransaction;
use crate::NullEngineConfig;

pub(crate) struct DbShared {
    pub(crate) name: String,
    pub(crate) state: Mutex<DbState>,
}

pub(crate) struct EngineShared {
    pub(crate) config: NullEngineConfig,
    databases: Mutex<HashMap<String, Arc<DbShared>>>,
    transactions: Mutex<Vec<Weak<NullTransaction>>>,
    next_tx_id: AtomicU64,
    started: AtomicU64,
}

/// An in-memory engine. Cloning shares the same databases.
#[derive(Clone)]
pub struct NullEngine {
    shared: Arc<EngineShared>,
}

impl NullEngine {
    pub fn new() -> Self {
        Self::with_config(NullEngineConfig::default())
    }

    pub fn with_config(config: NullEngineConfig) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                config,
                databases: Mutex::new(HashMap::new()),
                transactions: Mutex::new(Vec::new()),
                next_tx_id: AtomicU64::new(1),
                started: AtomicU64::new(0),
            }),
        }
    }

    /// An engine whose transactions only commit through [`commit_idle`](Self::commit_idle).
    pub fn manual() -> Self {
        Self::with_config(NullEngineConfig::manual())
    }

    pub fn config(&self) -> &NullEngineConfig {
        &self.shared.config
    }

    /// Total transactions begun across all databases.
    pub fn transactions_started(&self) -> u64 {
        self.shared.started.load(Ordering::Relaxed)
    }

    /// Transactions begun and not yet finished.
    pub fn active_transactions(&self) -> usize {
        self.shared
            .live_transactions()
            .iter()
            .filter(|tx| tx.is_active())
            .count()
    }

    /// Commit every transaction with no pending request, as if the event
    /// loop had just gone idle. Returns how many committed.
    pub fn commit_idle(&self) -> usize {
        self.shared
            .live_transactions()
            .iter()
            .filter(|tx| tx.commit_if_idle(None))
            .count()
    }

    /// Abort every active transaction, rolling back its writes.
    pub fn abort_all(&self) -> usize {
        let live = self.shared.live_transactions();
        let mut aborted = 0;
        for tx in live.iter().filter(|tx| tx.is_active()) {
            tx.abort();
            aborted += 1;
        }
        aborted
    }

    /// The stored version of a database, if it has ever been opened.
    pub fn database_version(&self, name: &str) -> Option<u32> {
        let databases = lock(&self.shared.databases);
        let db = databases.get(name)?;
        let version = lock(&db.state).version;
        Some(version)
    }

    /// Number of records currently stored in `store` of database `name`.
    pub fn record_count(&self, name: &str, store: &str) -> Option<usize> {
        let databases = lock(&self.shared.databases);
        let db = databases.get(name)?;
        let state = lock(&db.state);
        state.stores.get(store).map(|s| s.records.len())
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineShared {
    fn live_transactions(&self) -> Vec<Arc<NullTransaction>> {
        let mut registry = lock(&self.transactions);
        registry.retain(|weak| weak.strong_count() > 0);
        registry.iter().filter_map(Weak::upgrade).collect()
    }

    fn open_database(
        &self,
        name: &str,
        version: u32,
        on_upgrade: UpgradeHandler,
    ) -> Result<Arc<DbShared>, EngineError> {
        if version == 0 {
            return Err(EngineError::Data("database version must be at least 1".into()));
        }
        let db = {
            let mut databases = lock(&self.databases);
            Arc::clone(databases.entry(name.to_string()).or_insert_with(|| {
                Arc::new(DbShared {
                    name: name.to_string(),
                    state: Mutex::new(DbState::default()),
                })
            }))
        };

        let mut state = lock(&db.state);
        if state.version > version {
            return Err(EngineError::Version {
                stored: state.version,
                requested: version,
            });
        }
        if state.version < version {
            let old_version = state.version;
            // Upgrade against a copy so a failing handler leaves nothing behind.
            let mut staged = state.clone();
            on_upgrade(&mut NullUpgrade { state: &mut staged }, old_version)?;
            staged.version = version;
            *state = staged;
            info!(db = name, from = old_version, to = version, "database upgraded");
        }
        drop(state);
        Ok(db)
    }
}

impl Engine for NullEngine {
    fn open(
        &self,
        name: &str,
        version: u32,
        on_upgrade: UpgradeHandler,
    ) -> Request<Arc<dyn Database>> {
        let (request, responder) = request();
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        let open = move || {
            let outcome = shared
                .open_database(&name, version, on_upgrade)
                .map(|db| {
                    debug!(db = %name, version, "database opened");
                    Arc::new(NullDatabase {
                        engine: shared,
                        db,
                        version,
                        closed: AtomicBool::new(false),
                    }) as Arc<dyn Database>
                });
            responder.settle_with(outcome);
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { open() });
            }
            Err(_) => open(),
        }
        request
    }
}

/// A connection to one null database.
pub struct NullDatabase {
    engine: Arc<EngineShared>,
    db: Arc<DbShared>,
    version: u32,
    closed: AtomicBool,
}

impl Database for NullDatabase {
    fn name(&self) -> &str {
        &self.db.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        lock(&self.db.state).stores.keys().cloned().collect()
    }

    fn transaction(
        &self,
        stores: &[&str],
        mode: Mode,
    ) -> Result<Arc<dyn Transaction>, EngineError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::InvalidState(format!(
                "connection to '{}' is closed",
                self.db.name
            )));
        }
        if stores.is_empty() {
            return Err(EngineError::InvalidState("transaction scope is empty".into()));
        }
        {
            let state = lock(&self.db.state);
            for store in stores {
                state.store(store)?;
            }
        }

        let id = self.engine.next_tx_id.fetch_add(1, Ordering::Relaxed);
        let scope = stores.iter().map(|s| s.to_string()).collect();
        let tx = NullTransaction::begin(
            id,
            mode,
            scope,
            Arc::clone(&self.db),
            Arc::clone(&self.engine),
        );
        lock(&self.engine.transactions).push(Arc::downgrade(&tx));
        self.engine.started.fetch_add(1, Ordering::Relaxed);
        debug!(db = %self.db.name, tx = id, %mode, ?stores, "transaction started");
        Ok(tx)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(db = %self.db.name, "connection closed");
        }
    }
}

struct NullUpgrade<'a> {
    state: &'a mut DbState,
}

impl Upgrade for NullUpgrade<'_> {
    fn store_names(&self) -> Vec<String> {
        self.state.stores.keys().cloned().collect()
    }

    fn create_object_store(
        &mut self,
        name: &str,
        key_path: &KeyPath,
        auto_increment: bool,
    ) -> Result<(), EngineError> {
        if self.state.stores.contains_key(name) {
            return Err(EngineError::Constraint(format!(
                "object store '{name}' already exists"
            )));
        }
        self.state.stores.insert(
            name.to_string(),
            StoreData::new(key_path.clone(), auto_increment),
        );
        Ok(())
    }

    fn index_names(&self, store: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.state.store(store)?.indexes.keys().cloned().collect())
    }

    fn create_index(
        &mut self,
        store: &str,
        name: &str,
        key_path: &KeyPath,
        unique: bool,
    ) -> Result<(), EngineError> {
        self.state
            .store_mut(store)?
            .add_index(name, IndexDef::new(key_path.clone(), unique))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    fn no_upgrade() -> UpgradeHandler {
        Box::new(|_, _| Ok(()))
    }

    fn fruit_upgrade() -> UpgradeHandler {
        Box::new(|upgrade, _| {
            let name = KeyPath::parse("name").expect("valid");
            let color = KeyPath::parse("color").expect("valid");
            upgrade.create_object_store("fruit", &name, false)?;
            upgrade.create_index("fruit", "color", &color, false)
        })
    }

    /// Outside a runtime every notification is delivered inline.
    fn settle<T: Send + 'static>(request: Request<T>) -> Result<T, EngineError> {
        let (tx, rx) = mpsc::channel();
        request.on_settled(move |r| {
            let _ = tx.send(r);
        });
        rx.recv().expect("settled inline")
    }

    #[test]
    fn open_runs_upgrade_once() {
        let engine = NullEngine::manual();
        let db = settle(engine.open("example", 1, fruit_upgrade())).unwrap();
        assert_eq!(db.store_names(), vec!["fruit".to_string()]);
        assert_eq!(engine.database_version("example"), Some(1));

        // Same version: no upgrade, so a handler that would fail never runs.
        let again = settle(engine.open(
            "example",
            1,
            Box::new(|_, _| Err(EngineError::InvalidState("should not run".into()))),
        ));
        assert!(again.is_ok());
    }

    #[test]
    fn older_version_request_fails() {
        let engine = NullEngine::manual();
        settle(engine.open("example", 2, fruit_upgrade())).unwrap();
        let err = settle(engine.open("example", 1, no_upgrade())).err().unwrap();
        assert_eq!(err, EngineError::Version { stored: 2, requested: 1 });
    }

    #[test]
    fn failed_upgrade_leaves_version_unchanged() {
        let engine = NullEngine::manual();
        let err = settle(engine.open(
            "example",
            1,
            Box::new(|_, _| Err(EngineError::Constraint("boom".into()))),
        ))
        .err()
        .unwrap();
        assert_eq!(err, EngineError::Constraint("boom".into()));
        assert_eq!(engine.database_version("example"), Some(0));
    }

    #[test]
    fn closed_connection_refuses_transactions() {
        let engine = NullEngine::manual();
        let db = settle(engine.open("example", 1, fruit_upgrade())).unwrap();
        db.close();
        let err = db.transaction(&["fruit"], Mode::ReadOnly).err().unwrap();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn unknown_store_is_not_found() {
        let engine = NullEngine::manual();
        let db = settle(engine.open("example", 1, fruit_upgrade())).unwrap();
        let err = db.transaction(&["veg"], Mode::ReadOnly).err().unwrap();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn manual_transactions_commit_on_demand() {
        let engine = NullEngine::manual();
        let db = settle(engine.open("example", 1, fruit_upgrade())).unwrap();
        let tx = db.transaction(&["fruit"], Mode::ReadWrite).unwrap();
        let store = tx.object_store("fruit").unwrap();
        settle(store.put(json!({"name": "apple", "color": "green"})).unwrap()).unwrap();
        assert_eq!(engine.active_transactions(), 1);
        assert_eq!(engine.commit_idle(), 1);
        assert!(tx.is_finished());
        assert_eq!(
            store.get(&"apple".into()).err(),
            Some(EngineError::TransactionInactive)
        );
        assert_eq!(engine.record_count("example", "fruit"), Some(1));
        assert_eq!(engine.transactions_started(), 1);
    }

    #[test]
    fn abort_rolls_back_writes() {
        let engine = NullEngine::manual();
        let db = settle(engine.open("example", 1, fruit_upgrade())).unwrap();
        let tx = db.transaction(&["fruit"], Mode::ReadWrite).unwrap();
        let store = tx.object_store("fruit").unwrap();
        settle(store.put(json!({"name": "apple", "color": "green"})).unwrap()).unwrap();
        let (outcome_tx, outcome_rx) = mpsc::channel();
        tx.on_finish(Box::new(move |outcome| {
            let _ = outcome_tx.send(outcome);
        }));
        assert_eq!(engine.abort_all(), 1);
        assert_eq!(outcome_rx.recv().unwrap(), larder_store::TxOutcome::Aborted);
        assert_eq!(engine.record_count("example", "fruit"), Some(0));
    }

    #[test]
    fn readonly_transaction_rejects_writes() {
        let engine = NullEngine::manual();
        let db = settle(engine.open("example", 1, fruit_upgrade())).unwrap();
        let tx = db.transaction(&["fruit"], Mode::ReadOnly).unwrap();
        let store = tx.object_store("fruit").unwrap();
        assert_eq!(
            store.put(json!({"name": "apple"})).err(),
            Some(EngineError::ReadOnly)
        );
    }

    #[tokio::test]
    async fn idle_transactions_commit_by_themselves() {
        let engine = NullEngine::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        engine
            .open("example", 1, fruit_upgrade())
            .on_settled(move |r| {
                let _ = tx.send(r);
            });
        let db = rx.await.unwrap().unwrap();
        let txn = db.transaction(&["fruit"], Mode::ReadOnly).unwrap();
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        assert!(txn.is_finished());
        assert_eq!(engine.active_transactions(), 0);
    }
}
