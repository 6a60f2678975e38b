//! Engine gateway: the one place engine callbacks become awaitable results.
//!
//! Everything above this module awaits futures; nothing else registers an
//! engine callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, Instrument};

use larder_store::{Database, Engine, EngineError, Request, Upgrade};
use larder_types::Schema;

use crate::tracing_spans::open_span;
use crate::SessionError;

/// Await the single settlement of an engine request. No retries.
pub async fn await_request<T: Send + 'static>(request: Request<T>) -> Result<T, EngineError> {
    let (tx, rx) = oneshot::channel();
    request.on_settled(move |outcome| {
        // The awaiting side may have been dropped; the outcome is then unwanted.
        let _ = tx.send(outcome);
    });
    rx.await.unwrap_or(Err(EngineError::Abandoned))
}

/// Open the database a schema describes, creating any missing stores and
/// indexes when the stored version is older than the schema's.
///
/// The schema is validated before the engine is contacted.
pub async fn open_database(engine: &dyn Engine, schema: &Schema) -> Result<Connection, SessionError> {
    schema.validate()?;
    let name = schema.name()?.to_string();
    let version = schema.version;

    let declared = schema.clone();
    let request = engine.open(
        &name,
        version,
        Box::new(move |upgrade, old_version| initialize(upgrade, &declared, old_version)),
    );
    let db = await_request(request)
        .instrument(open_span(&name, version))
        .await
        .map_err(|source| SessionError::Open {
            name: name.clone(),
            version,
            source,
        })?;
    debug!(db = %name, version, "connection opened");

    Ok(Connection {
        db,
        schema: schema.clone(),
        closed: AtomicBool::new(false),
    })
}

fn initialize(
    upgrade: &mut dyn Upgrade,
    schema: &Schema,
    old_version: u32,
) -> Result<(), EngineError> {
    let existing = upgrade.store_names();
    for (store_name, store) in &schema.stores {
        if !existing.contains(store_name) {
            let key_path = store
                .key_path()
                .map_err(|e| EngineError::Data(e.to_string()))?;
            upgrade.create_object_store(store_name, &key_path, store.options.auto_increment)?;
            info!(store = %store_name, key_path = %key_path, old_version, "created object store");
        }

        let existing_indexes = upgrade.index_names(store_name)?;
        for (index_name, index) in &store.indexes {
            if existing_indexes.contains(index_name) {
                continue;
            }
            let key_path = store
                .index_key_path(store_name, index_name)
                .map_err(|e| EngineError::Data(e.to_string()))?;
            upgrade.create_index(store_name, index_name, &key_path, index.options.unique)?;
            info!(store = %store_name, index = %index_name, key_path = %key_path, "created index");
        }
    }
    Ok(())
}

/// One open database connection.
///
/// Closed explicitly with [`Connection::close`] or when dropped.
pub struct Connection {
    db: Arc<dyn Database>,
    schema: Schema,
    closed: AtomicBool,
}

impl Connection {
    pub fn name(&self) -> &str {
        self.db.name()
    }

    pub fn version(&self) -> u32 {
        self.db.version()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.db.close();
            debug!(db = %self.db.name(), "connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_nullables::NullEngine;
    use larder_store::request;
    use larder_types::{Mode, SchemaError, StoreSchema};

    fn fruit_schema(version: u32) -> Schema {
        Schema::new("example", version).with_store(
            "fruit",
            StoreSchema::new("name").with_index("color", "color", false),
        )
    }

    #[tokio::test]
    async fn await_request_resolves_success() {
        let (req, resp) = request::<u64>();
        resp.succeed(3);
        assert_eq!(await_request(req).await, Ok(3));
    }

    #[tokio::test]
    async fn await_request_resolves_failure_from_another_task() {
        let (req, resp) = request::<u64>();
        tokio::spawn(async move { resp.fail(EngineError::ReadOnly) });
        assert_eq!(await_request(req).await, Err(EngineError::ReadOnly));
    }

    #[tokio::test]
    async fn opens_and_initializes_declared_stores() {
        let engine = NullEngine::manual();
        let conn = open_database(&engine, &fruit_schema(1)).await.expect("open");
        assert_eq!(conn.name(), "example");
        assert_eq!(conn.version(), 1);
        assert_eq!(conn.database().store_names(), vec!["fruit".to_string()]);
        let tx = conn.database().transaction(&["fruit"], Mode::ReadOnly).unwrap();
        let store = tx.object_store("fruit").unwrap();
        assert_eq!(store.index_names(), vec!["color".to_string()]);
    }

    #[tokio::test]
    async fn upgrade_adds_only_missing_structures() {
        let engine = NullEngine::manual();
        open_database(&engine, &fruit_schema(1)).await.expect("v1");
        let v2 = fruit_schema(2).with_store("veg", StoreSchema::new("id").auto_increment());
        let conn = open_database(&engine, &v2).await.expect("v2");
        assert_eq!(
            conn.database().store_names(),
            vec!["fruit".to_string(), "veg".to_string()]
        );
        assert_eq!(engine.database_version("example"), Some(2));
    }

    #[tokio::test]
    async fn downgrade_is_an_open_error() {
        let engine = NullEngine::manual();
        open_database(&engine, &fruit_schema(3)).await.expect("v3");
        let err = open_database(&engine, &fruit_schema(2)).await.err().unwrap();
        match err {
            SessionError::Open { name, version, source } => {
                assert_eq!(name, "example");
                assert_eq!(version, 2);
                assert_eq!(source, EngineError::Version { stored: 3, requested: 2 });
            }
            other => panic!("expected open error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nameless_schema_fails_before_open() {
        let engine = NullEngine::manual();
        let mut schema = fruit_schema(1);
        schema.name = None;
        let err = open_database(&engine, &schema).await.err().unwrap();
        assert!(matches!(err, SessionError::Schema(SchemaError::MissingName)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_transactions() {
        let engine = NullEngine::manual();
        let conn = open_database(&engine, &fruit_schema(1)).await.expect("open");
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(conn.database().transaction(&["fruit"], Mode::ReadOnly).is_err());
    }
}
