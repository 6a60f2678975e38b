//! The transaction lease held by one store session.
//!
//! A lease is `Empty` until first use, `Active` while the session holds an
//! open transaction, and `Closed` once the engine finishes that transaction.
//! Acquiring never suspends: the validity check and the engine
//! `transaction()` call happen under one lock, with no `.await` between them.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use larder_store::{Database, EngineError, ObjectStore};
use larder_types::Mode;
use larder_utils::lock;

/// Observable lease state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    Empty,
    Active(Mode),
    Closed,
}

/// Liveness flag of one leased transaction. Cursors keep a clone.
#[derive(Clone, Debug)]
pub(crate) struct LeaseToken(Arc<AtomicBool>);

impl LeaseToken {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What an operation borrows from the lease for the duration of one issue.
#[derive(Clone)]
pub(crate) struct LeaseHandle {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) token: LeaseToken,
    pub(crate) generation: u64,
    pub(crate) mode: Mode,
}

impl fmt::Debug for LeaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseHandle")
            .field("store", &self.store.name())
            .field("generation", &self.generation)
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquisition {
    Reused,
    Opened,
}

enum LeaseState {
    Empty,
    Active(LeaseHandle),
    Closed,
}

struct LeaseCell {
    state: LeaseState,
    /// Bumped on every opened transaction; finish observers compare it so a
    /// late notification never closes a newer lease.
    generation: u64,
}

pub(crate) struct Lease {
    cell: Arc<Mutex<LeaseCell>>,
}

impl Lease {
    pub(crate) fn new() -> Self {
        Self {
            cell: Arc::new(Mutex::new(LeaseCell {
                state: LeaseState::Empty,
                generation: 0,
            })),
        }
    }

    pub(crate) fn status(&self) -> LeaseStatus {
        match &lock(&self.cell).state {
            LeaseState::Empty => LeaseStatus::Empty,
            LeaseState::Active(handle) => LeaseStatus::Active(handle.mode),
            LeaseState::Closed => LeaseStatus::Closed,
        }
    }

    /// Reuse the held transaction if it is open and its mode satisfies
    /// `mode`, otherwise open a new one scoped to `store` and replace it.
    pub(crate) fn acquire(
        &self,
        db: &dyn Database,
        store: &str,
        mode: Mode,
    ) -> Result<(LeaseHandle, Acquisition), EngineError> {
        let (handle, tx) = {
            let mut cell = lock(&self.cell);
            if let LeaseState::Active(held) = &cell.state {
                if held.token.is_open() && held.mode.satisfies(mode) {
                    return Ok((held.clone(), Acquisition::Reused));
                }
            }

            let tx = db.transaction(&[store], mode)?;
            let object_store = tx.object_store(store)?;
            cell.generation += 1;
            let handle = LeaseHandle {
                store: object_store,
                token: LeaseToken::new(),
                generation: cell.generation,
                mode,
            };
            // A replaced readonly transaction stays usable by its own cursors
            // until the engine finishes it.
            cell.state = LeaseState::Active(handle.clone());
            (handle, tx)
        };

        // Registered after the lock is released: an engine may run the
        // observer inline if the transaction already finished.
        let cell = Arc::downgrade(&self.cell);
        let token = handle.token.clone();
        let generation = handle.generation;
        tx.on_finish(Box::new(move |outcome| {
            token.close();
            if let Some(cell) = cell.upgrade() {
                let mut cell = lock(&cell);
                let current = matches!(
                    &cell.state,
                    LeaseState::Active(held) if held.generation == generation
                );
                if current {
                    cell.state = LeaseState::Closed;
                }
            }
            debug!(generation, ?outcome, "lease transaction finished");
        }));

        Ok((handle, Acquisition::Opened))
    }

    /// Mark the lease of `generation` closed after the engine reported it
    /// inactive before its finish notification arrived.
    pub(crate) fn invalidate(&self, generation: u64) {
        let mut cell = lock(&self.cell);
        if let LeaseState::Active(held) = &cell.state {
            if held.generation == generation {
                held.token.close();
                cell.state = LeaseState::Closed;
            }
        }
    }

    /// Drop the held transaction handle without waiting for the engine.
    pub(crate) fn release(&self) {
        let previous = mem::replace(&mut lock(&self.cell).state, LeaseState::Empty);
        if let LeaseState::Active(held) = previous {
            held.token.close();
        }
    }
}
