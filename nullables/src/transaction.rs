//! Null transactions: request bookkeeping, idle commit and rollback.

use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tracing::{debug, trace};

use larder_store::{
    request, EngineError, FinishObserver, ObjectStore, Request, Transaction, TxOutcome,
};
use larder_types::Mode;
use larder_utils::lock;

use crate::config::AutoCommit;
use crate::engine::{DbShared, EngineShared};
use crate::object_store::NullObjectStore;
use crate::records::{DbState, Undo};

enum Phase {
    Active,
    Finished(TxOutcome),
}

struct TxState {
    phase: Phase,
    /// Requests issued but not yet settled.
    pending: usize,
    /// Bumped on every issued request; an idle commit scheduled under an
    /// older epoch is stale.
    epoch: u64,
    undo: Vec<Undo>,
    observers: Vec<FinishObserver>,
}

pub struct NullTransaction {
    id: u64,
    mode: Mode,
    scope: Vec<String>,
    db: Arc<DbShared>,
    engine: Arc<EngineShared>,
    me: Weak<NullTransaction>,
    state: Mutex<TxState>,
}

impl NullTransaction {
    pub(crate) fn begin(
        id: u64,
        mode: Mode,
        scope: Vec<String>,
        db: Arc<DbShared>,
        engine: Arc<EngineShared>,
    ) -> Arc<Self> {
        let tx = Arc::new_cyclic(|me| Self {
            id,
            mode,
            scope,
            db,
            engine,
            me: me.clone(),
            state: Mutex::new(TxState {
                phase: Phase::Active,
                pending: 0,
                epoch: 0,
                undo: Vec::new(),
                observers: Vec::new(),
            }),
        });
        // A transaction nobody uses still commits once idle.
        tx.schedule_idle_commit(0);
        tx
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn db(&self) -> &Arc<DbShared> {
        &self.db
    }

    pub fn is_active(&self) -> bool {
        matches!(lock(&self.state).phase, Phase::Active)
    }

    pub(crate) fn ensure_active(&self) -> Result<(), EngineError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(EngineError::TransactionInactive)
        }
    }

    /// Run `op` against the database now and deliver its outcome
    /// asynchronously through the returned request.
    pub(crate) fn issue<T, F>(&self, write: bool, op: F) -> Result<Request<T>, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut DbState, &mut Vec<Undo>) -> Result<T, EngineError>,
    {
        let this = self.me.upgrade().ok_or(EngineError::TransactionInactive)?;
        let outcome = {
            let mut state = lock(&self.state);
            if !matches!(state.phase, Phase::Active) {
                return Err(EngineError::TransactionInactive);
            }
            if write && self.mode == Mode::ReadOnly {
                return Err(EngineError::ReadOnly);
            }
            state.pending += 1;
            state.epoch += 1;
            let mut db = lock(&self.db.state);
            op(&mut db, &mut state.undo)
        };
        trace!(tx = self.id, write, "request issued");

        let (request, responder) = request();
        dispatch(move || {
            let failure = outcome.as_ref().err().map(ToString::to_string);
            responder.settle_with(outcome);
            this.request_settled(failure);
        });
        Ok(request)
    }

    fn request_settled(&self, failure: Option<String>) {
        if let Some(reason) = failure {
            self.finish(TxOutcome::Failed(reason));
            return;
        }
        let idle_epoch = {
            let mut state = lock(&self.state);
            state.pending = state.pending.saturating_sub(1);
            match state.phase {
                Phase::Active if state.pending == 0 => Some(state.epoch),
                _ => None,
            }
        };
        if let Some(epoch) = idle_epoch {
            self.schedule_idle_commit(epoch);
        }
    }

    fn schedule_idle_commit(&self, epoch: u64) {
        let AutoCommit::OnIdle { yields } = self.engine.config.auto_commit else {
            return;
        };
        let Some(this) = self.me.upgrade() else {
            return;
        };
        // Without a runtime, idle transactions only commit via `commit_idle`.
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                for _ in 0..yields {
                    tokio::task::yield_now().await;
                }
                this.commit_if_idle(Some(epoch));
            });
        }
    }

    /// Commit if no request is pending and, when `epoch` is given, none was
    /// issued since it was observed. Returns whether the transaction committed.
    pub(crate) fn commit_if_idle(&self, epoch: Option<u64>) -> bool {
        let idle = {
            let state = lock(&self.state);
            matches!(state.phase, Phase::Active)
                && state.pending == 0
                && epoch.map_or(true, |e| e == state.epoch)
        };
        if idle {
            self.finish(TxOutcome::Complete);
        }
        idle
    }

    pub(crate) fn finish(&self, outcome: TxOutcome) {
        let (observers, undo) = {
            let mut state = lock(&self.state);
            if !matches!(state.phase, Phase::Active) {
                return;
            }
            state.phase = Phase::Finished(outcome.clone());
            let undo = std::mem::take(&mut state.undo);
            (std::mem::take(&mut state.observers), undo)
        };
        if outcome != TxOutcome::Complete && !undo.is_empty() {
            lock(&self.db.state).undo(undo);
        }
        debug!(tx = self.id, mode = %self.mode, ?outcome, "transaction finished");
        for observer in observers {
            observer(outcome.clone());
        }
    }
}

impl Transaction for NullTransaction {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn object_store(&self, name: &str) -> Result<Arc<dyn ObjectStore>, EngineError> {
        self.ensure_active()?;
        if !self.scope.iter().any(|s| s == name) {
            return Err(EngineError::NotFound(format!(
                "object store '{name}' is not in this transaction's scope"
            )));
        }
        let this = self.me.upgrade().ok_or(EngineError::TransactionInactive)?;
        let store = NullObjectStore::new(this, name)?;
        Ok(Arc::new(store))
    }

    fn on_finish(&self, observer: FinishObserver) {
        let finished = {
            let mut state = lock(&self.state);
            match &state.phase {
                Phase::Active => {
                    state.observers.push(observer);
                    return;
                }
                Phase::Finished(outcome) => outcome.clone(),
            }
        };
        observer(finished);
    }

    fn abort(&self) {
        self.finish(TxOutcome::Aborted);
    }

    fn is_finished(&self) -> bool {
        !self.is_active()
    }
}

/// Deliver a notification from a fresh task, as an event loop would.
/// Outside a runtime the notification is delivered inline.
fn dispatch(task: impl FnOnce() + Send + 'static) {
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { task() });
        }
        Err(_) => task(),
    }
}
