// Shared by several test files; not every helper is used by each.
#![allow(dead_code)]

use std::sync::Arc;

use larder_nullables::NullEngine;
use larder_session::{Schema, StoreSession};
use larder_store::{
    request, Database, Engine, EngineError, FinishObserver, ObjectStore, Request, Transaction,
    UpgradeHandler,
};
use larder_types::{Mode, StoreSchema};
use serde_json::{json, Value};

pub fn fruit_schema() -> Schema {
    Schema::new("example", 1).with_store(
        "fruit",
        StoreSchema::new("name").with_index("color", "color", false),
    )
}

pub fn fruit(name: &str, color: &str) -> Value {
    json!({ "name": name, "color": color })
}

pub async fn fruit_session(engine: &NullEngine) -> StoreSession {
    StoreSession::connect(engine, &fruit_schema(), "fruit")
        .await
        .expect("connect")
}

/// Wraps a [`NullEngine`] but never delivers transaction finish
/// notifications, so a session only learns its lease is gone when a
/// request fails.
pub struct SilentEngine(pub NullEngine);

struct SilentDatabase(Arc<dyn Database>);

struct SilentTransaction(Arc<dyn Transaction>);

impl Engine for SilentEngine {
    fn open(&self, name: &str, version: u32, on_upgrade: UpgradeHandler) -> Request<Arc<dyn Database>> {
        let (outer, responder) = request();
        self.0.open(name, version, on_upgrade).on_settled(move |outcome| {
            responder.settle_with(
                outcome.map(|db| Arc::new(SilentDatabase(db)) as Arc<dyn Database>),
            );
        });
        outer
    }
}

impl Database for SilentDatabase {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn version(&self) -> u32 {
        self.0.version()
    }

    fn store_names(&self) -> Vec<String> {
        self.0.store_names()
    }

    fn transaction(&self, stores: &[&str], mode: Mode) -> Result<Arc<dyn Transaction>, EngineError> {
        Ok(Arc::new(SilentTransaction(self.0.transaction(stores, mode)?)))
    }

    fn close(&self) {
        self.0.close()
    }
}

impl Transaction for SilentTransaction {
    fn mode(&self) -> Mode {
        self.0.mode()
    }

    fn object_store(&self, name: &str) -> Result<Arc<dyn ObjectStore>, EngineError> {
        self.0.object_store(name)
    }

    fn on_finish(&self, _observer: FinishObserver) {}

    fn abort(&self) {
        self.0.abort()
    }

    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}
