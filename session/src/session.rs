//! Store sessions: the public store API over a leased transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::Value;
use tracing::{debug, trace, warn, Instrument};

use larder_store::{Engine, EngineError, ObjectStore, Request};
use larder_types::{Key, KeyPath, Mode, Schema, Term};
use larder_utils::StatsCounter;

use crate::cursor::Cursor;
use crate::gateway::{await_request, open_database, Connection};
use crate::lease::{Acquisition, Lease, LeaseHandle, LeaseStatus};
use crate::tracing_spans::{connect_span, store_op_span};
use crate::{Operation, SessionConfig, SessionError, Target};

const LEASE_OPENED: &str = "lease_opened";
const LEASE_REUSED: &str = "lease_reused";
const LEASE_RENEWED: &str = "lease_renewed";

/// Store structure captured once at connect time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreMetadata {
    pub key_path: KeyPath,
    pub index_names: Vec<String>,
    pub auto_increment: bool,
}

/// Lease counters of one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LeaseStats {
    /// Transactions the session opened, including the metadata capture.
    pub opened: u64,
    /// Operations that ran on an already held transaction.
    pub reused: u64,
    /// Leases reopened after the engine reported them inactive.
    pub renewed: u64,
}

/// A long-lived handle to one object store.
///
/// Operations issued without suspending in between share one engine
/// transaction; the session opens a new one whenever the held transaction
/// has closed or is readonly while a write is requested.
pub struct StoreSession {
    connection: Connection,
    store: String,
    metadata: StoreMetadata,
    lease: Lease,
    config: SessionConfig,
    closed: Arc<AtomicBool>,
    stats: StatsCounter,
}

impl StoreSession {
    /// Open the schema's database and bind a session to `store`.
    pub async fn connect(
        engine: &dyn Engine,
        schema: &Schema,
        store: &str,
    ) -> Result<Self, SessionError> {
        Self::connect_with_config(engine, schema, store, SessionConfig::default()).await
    }

    pub async fn connect_with_config(
        engine: &dyn Engine,
        schema: &Schema,
        store: &str,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        schema.validate()?;
        schema.store(store)?;
        let span = connect_span(schema.name()?, store);

        async move {
            let connection = open_database(engine, schema).await?;
            let lease = Lease::new();
            let stats = StatsCounter::new(&[LEASE_OPENED, LEASE_REUSED, LEASE_RENEWED]);

            let (handle, _) = lease
                .acquire(connection.database(), store, Mode::ReadOnly)
                .map_err(|source| SessionError::Engine {
                    op: Operation::Metadata,
                    store: store.to_string(),
                    target: Target::Store,
                    source,
                })?;
            stats.increment(LEASE_OPENED);
            let metadata = StoreMetadata {
                key_path: handle.store.key_path().clone(),
                index_names: handle.store.index_names(),
                auto_increment: handle.store.auto_increment(),
            };
            // The capture lease is not kept for later operations.
            lease.release();
            debug!(key_path = %metadata.key_path, indexes = ?metadata.index_names, "session connected");

            Ok::<_, SessionError>(Self {
                connection,
                store: store.to_string(),
                metadata,
                lease,
                config,
                closed: Arc::new(AtomicBool::new(false)),
                stats,
            })
        }
        .instrument(span)
        .await
    }

    pub fn store_name(&self) -> &str {
        &self.store
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    pub fn key_path(&self) -> &KeyPath {
        &self.metadata.key_path
    }

    pub fn index_names(&self) -> &[String] {
        &self.metadata.index_names
    }

    pub fn lease_status(&self) -> LeaseStatus {
        self.lease.status()
    }

    /// Mode of the held transaction, if one is active.
    pub fn lease_mode(&self) -> Option<Mode> {
        match self.lease.status() {
            LeaseStatus::Active(mode) => Some(mode),
            LeaseStatus::Empty | LeaseStatus::Closed => None,
        }
    }

    pub fn stats(&self) -> LeaseStats {
        LeaseStats {
            opened: self.stats.get(LEASE_OPENED),
            reused: self.stats.get(LEASE_REUSED),
            renewed: self.stats.get(LEASE_RENEWED),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the session and its connection. Idempotent; open cursors
    /// become stale.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.lease.release();
            self.connection.close();
            debug!(store = %self.store, "session closed");
        }
    }

    /// The record stored under `key`, or `None`.
    pub async fn read(&self, key: impl Into<Key>) -> Result<Option<Value>, SessionError> {
        let key = key.into();
        let target = Target::Key(key.clone());
        async {
            let (request, _) = self.issue(Mode::ReadOnly, Operation::Read, &target, |store| {
                store.get(&key)
            })?;
            self.complete(Operation::Read, target.clone(), request).await
        }
        .instrument(store_op_span(&self.store, Operation::Read))
        .await
    }

    /// Records for `keys` in input order, `None` for absent keys. All reads
    /// are issued on one transaction before any is awaited.
    pub async fn read_many<K: Into<Key>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Vec<Option<Value>>, SessionError> {
        self.check_open()?;
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        async {
            let target = Target::Keys(keys.len());
            let (requests, _) = self.issue(Mode::ReadOnly, Operation::ReadMany, &target, |store| {
                keys.iter()
                    .map(|key| store.get(key))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            let pending = requests.into_iter().zip(keys.iter()).map(|(request, key)| async move {
                await_request(request)
                    .await
                    .map_err(|source| (key.clone(), source))
            });
            try_join_all(pending).await.map_err(|(key, source)| {
                self.engine_error(Operation::ReadMany, Target::Key(key), source)
            })
        }
        .instrument(store_op_span(&self.store, Operation::ReadMany))
        .await
    }

    /// Insert or replace a record under its key-path key.
    pub async fn write(&self, record: Value) -> Result<(), SessionError> {
        let target = match self.metadata.key_path.extract(&record) {
            Some(key) => Target::Key(key),
            None => Target::KeylessRecord,
        };
        async {
            let (request, _) = self.issue(Mode::ReadWrite, Operation::Write, &target, |store| {
                store.put(record.clone())
            })?;
            let key = self.complete(Operation::Write, target.clone(), request).await?;
            trace!(%key, "record written");
            Ok::<_, SessionError>(())
        }
        .instrument(store_op_span(&self.store, Operation::Write))
        .await
    }

    /// Delete the record under `key`; absent keys are not an error.
    pub async fn remove(&self, key: impl Into<Key>) -> Result<(), SessionError> {
        let key = key.into();
        let target = Target::Key(key.clone());
        async {
            let (request, _) = self.issue(Mode::ReadWrite, Operation::Remove, &target, |store| {
                store.delete(&key)
            })?;
            self.complete(Operation::Remove, target.clone(), request).await
        }
        .instrument(store_op_span(&self.store, Operation::Remove))
        .await
    }

    /// Records whose primary key matches `term`, in key order.
    pub fn open_primary_key_cursor(&self, term: Option<Term>) -> Result<Cursor, SessionError> {
        let _span = store_op_span(&self.store, Operation::OpenCursor).entered();
        let target = Target::Range(term.clone());
        let (cursor, handle) = self.issue(Mode::ReadOnly, Operation::OpenCursor, &target, |store| {
            store.open_cursor(term.clone())
        })?;
        Ok(Cursor::new(
            cursor,
            handle.token,
            Arc::clone(&self.closed),
            self.store.clone(),
            target,
        ))
    }

    /// Records whose `index` key matches `term`, ordered by index key then
    /// primary key.
    pub fn open_index_cursor(&self, index: &str, term: Option<Term>) -> Result<Cursor, SessionError> {
        let _span = store_op_span(&self.store, Operation::OpenCursor).entered();
        let target = Target::Index {
            name: index.to_string(),
            term: term.clone(),
        };
        let (cursor, handle) = self.issue(Mode::ReadOnly, Operation::OpenCursor, &target, |store| {
            store.index(index)?.open_cursor(term.clone())
        })?;
        Ok(Cursor::new(
            cursor,
            handle.token,
            Arc::clone(&self.closed),
            self.store.clone(),
            target,
        ))
    }

    /// Number of records whose `index` key matches `term`.
    pub async fn count_by_index(&self, index: &str, term: impl Into<Term>) -> Result<u64, SessionError> {
        let term = term.into();
        let target = Target::Index {
            name: index.to_string(),
            term: Some(term.clone()),
        };
        async {
            let (request, _) = self.issue(Mode::ReadOnly, Operation::CountByIndex, &target, |store| {
                store.index(index)?.count(Some(&term))
            })?;
            self.complete(Operation::CountByIndex, target.clone(), request).await
        }
        .instrument(store_op_span(&self.store, Operation::CountByIndex))
        .await
    }

    /// Number of records whose primary key matches `term`, or all records.
    pub async fn count(&self, term: Option<Term>) -> Result<u64, SessionError> {
        let target = Target::Range(term.clone());
        async {
            let (request, _) = self.issue(Mode::ReadOnly, Operation::Count, &target, |store| {
                store.count(term.as_ref())
            })?;
            self.complete(Operation::Count, target.clone(), request).await
        }
        .instrument(store_op_span(&self.store, Operation::Count))
        .await
    }

    fn check_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed {
                store: self.store.clone(),
            });
        }
        Ok(())
    }

    /// Acquire a lease for `mode` and issue one engine call on it. If the
    /// engine reports the lease inactive, the lease is reopened and the call
    /// reissued, at most `max_lease_renewals` times.
    fn issue<T>(
        &self,
        mode: Mode,
        op: Operation,
        target: &Target,
        mut call: impl FnMut(&dyn ObjectStore) -> Result<T, EngineError>,
    ) -> Result<(T, LeaseHandle), SessionError> {
        self.check_open()?;
        let mut renewals = 0;
        loop {
            let handle = self.acquire(mode, op, target)?;
            match call(handle.store.as_ref()) {
                Ok(issued) => return Ok((issued, handle)),
                Err(EngineError::TransactionInactive) if renewals < self.config.max_lease_renewals => {
                    renewals += 1;
                    self.lease.invalidate(handle.generation);
                    self.stats.increment(LEASE_RENEWED);
                    debug!(
                        store = %self.store,
                        %op,
                        generation = handle.generation,
                        "lease inactive before use, renewing"
                    );
                }
                Err(source) => return Err(self.engine_error(op, target.clone(), source)),
            }
        }
    }

    fn acquire(&self, mode: Mode, op: Operation, target: &Target) -> Result<LeaseHandle, SessionError> {
        let (handle, acquisition) = self
            .lease
            .acquire(self.connection.database(), &self.store, mode)
            .map_err(|source| self.engine_error(op, target.clone(), source))?;
        match acquisition {
            Acquisition::Reused => {
                self.stats.increment(LEASE_REUSED);
                trace!(generation = handle.generation, %mode, "lease reused");
            }
            Acquisition::Opened => {
                self.stats.increment(LEASE_OPENED);
                debug!(store = %self.store, generation = handle.generation, %mode, "lease opened");
            }
        }
        Ok(handle)
    }

    async fn complete<T: Send + 'static>(
        &self,
        op: Operation,
        target: Target,
        request: Request<T>,
    ) -> Result<T, SessionError> {
        await_request(request)
            .await
            .map_err(|source| self.engine_error(op, target, source))
    }

    fn engine_error(&self, op: Operation, target: Target, source: EngineError) -> SessionError {
        warn!(store = %self.store, %op, %target, error = %source, "store operation failed");
        SessionError::Engine {
            op,
            store: self.store.clone(),
            target,
            source,
        }
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        self.close();
    }
}
