//! Store, index and cursor handles bound to a null transaction.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use larder_store::{Cursor, CursorEntry, EngineError, Index, ObjectStore, Request};
use larder_types::{Key, KeyPath, Term};
use larder_utils::lock;

use crate::records::{ScanSource, Undo};
use crate::transaction::NullTransaction;

pub struct NullObjectStore {
    tx: Arc<NullTransaction>,
    name: String,
    key_path: KeyPath,
    auto_increment: bool,
    index_names: Vec<String>,
}

impl NullObjectStore {
    pub(crate) fn new(tx: Arc<NullTransaction>, name: &str) -> Result<Self, EngineError> {
        let (key_path, auto_increment, index_names) = {
            let state = lock(&tx.db().state);
            let store = state.store(name)?;
            (
                store.key_path.clone(),
                store.auto_increment,
                store.indexes.keys().cloned().collect(),
            )
        };
        Ok(Self {
            tx,
            name: name.to_string(),
            key_path,
            auto_increment,
            index_names,
        })
    }
}

impl ObjectStore for NullObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    fn index_names(&self) -> Vec<String> {
        self.index_names.clone()
    }

    fn index(&self, name: &str) -> Result<Arc<dyn Index>, EngineError> {
        self.tx.ensure_active()?;
        let (key_path, unique) = {
            let state = lock(&self.tx.db().state);
            let index = state.store(&self.name)?.index(name)?;
            (index.key_path.clone(), index.unique)
        };
        Ok(Arc::new(NullIndex {
            tx: Arc::clone(&self.tx),
            store: self.name.clone(),
            name: name.to_string(),
            key_path,
            unique,
        }))
    }

    fn get(&self, key: &Key) -> Result<Request<Option<Value>>, EngineError> {
        let store = self.name.clone();
        let key = key.clone();
        self.tx.issue(false, move |db, _| {
            Ok(db.store(&store)?.records.get(&key).cloned())
        })
    }

    fn put(&self, record: Value) -> Result<Request<Key>, EngineError> {
        let store = self.name.clone();
        self.tx.issue(true, move |db, undo| {
            let (key, previous) = db.store_mut(&store)?.put(record)?;
            undo.push(Undo {
                store,
                key: key.clone(),
                previous,
            });
            Ok(key)
        })
    }

    fn delete(&self, key: &Key) -> Result<Request<()>, EngineError> {
        let store = self.name.clone();
        let key = key.clone();
        self.tx.issue(true, move |db, undo| {
            if let Some(previous) = db.store_mut(&store)?.remove(&key) {
                undo.push(Undo {
                    store,
                    key,
                    previous: Some(previous),
                });
            }
            Ok(())
        })
    }

    fn count(&self, term: Option<&Term>) -> Result<Request<u64>, EngineError> {
        let store = self.name.clone();
        let term = term.cloned();
        self.tx.issue(false, move |db, _| {
            db.store(&store)?.count(&ScanSource::Primary, term.as_ref())
        })
    }

    fn open_cursor(&self, term: Option<Term>) -> Result<Arc<dyn Cursor>, EngineError> {
        self.tx.ensure_active()?;
        Ok(Arc::new(NullCursor::new(
            Arc::clone(&self.tx),
            self.name.clone(),
            ScanSource::Primary,
            term,
        )))
    }
}

pub struct NullIndex {
    tx: Arc<NullTransaction>,
    store: String,
    name: String,
    key_path: KeyPath,
    unique: bool,
}

impl Index for NullIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    fn unique(&self) -> bool {
        self.unique
    }

    fn count(&self, term: Option<&Term>) -> Result<Request<u64>, EngineError> {
        let store = self.store.clone();
        let source = ScanSource::Index(self.name.clone());
        let term = term.cloned();
        self.tx.issue(false, move |db, _| {
            db.store(&store)?.count(&source, term.as_ref())
        })
    }

    fn open_cursor(&self, term: Option<Term>) -> Result<Arc<dyn Cursor>, EngineError> {
        self.tx.ensure_active()?;
        Ok(Arc::new(NullCursor::new(
            Arc::clone(&self.tx),
            self.store.clone(),
            ScanSource::Index(self.name.clone()),
            term,
        )))
    }
}

pub struct NullCursor {
    tx: Arc<NullTransaction>,
    store: String,
    source: ScanSource,
    term: Option<Term>,
    /// Last (scan key, primary key) produced.
    position: Arc<Mutex<Option<(Key, Key)>>>,
}

impl NullCursor {
    fn new(tx: Arc<NullTransaction>, store: String, source: ScanSource, term: Option<Term>) -> Self {
        Self {
            tx,
            store,
            source,
            term,
            position: Arc::new(Mutex::new(None)),
        }
    }
}

impl Cursor for NullCursor {
    fn advance(&self) -> Result<Request<Option<CursorEntry>>, EngineError> {
        let store = self.store.clone();
        let source = self.source.clone();
        let term = self.term.clone();
        let position = Arc::clone(&self.position);
        self.tx.issue(false, move |db, _| {
            let mut position = lock(&position);
            let next = db
                .store(&store)?
                .next_after(&source, term.as_ref(), position.as_ref())?;
            Ok(next.map(|(key, primary_key, value)| {
                *position = Some((key.clone(), primary_key.clone()));
                CursorEntry {
                    key,
                    primary_key,
                    value,
                }
            }))
        })
    }
}
