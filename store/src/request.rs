//! One-shot engine requests.
//!
//! An engine operation hands back a [`Request`] and keeps the matching
//! [`Responder`]. The engine settles the responder exactly once, from
//! whatever context its notification fires in; the requester registers a
//! single callback to receive the outcome. Dropping a responder without
//! settling it settles the request with [`EngineError::Abandoned`], so a
//! request never stays pending because its engine side went away.

use std::fmt;
use std::sync::{Arc, Mutex};

use larder_utils::lock;

use crate::EngineError;

type Callback<T> = Box<dyn FnOnce(Result<T, EngineError>) + Send>;

struct Slot<T> {
    settled: bool,
    outcome: Option<Result<T, EngineError>>,
    callback: Option<Callback<T>>,
}

/// The requester's half of a pending engine operation.
pub struct Request<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

/// The engine's half of a pending operation.
pub struct Responder<T> {
    slot: Arc<Mutex<Slot<T>>>,
    settled: bool,
}

/// Create a linked request/responder pair.
pub fn request<T>() -> (Request<T>, Responder<T>) {
    let slot = Arc::new(Mutex::new(Slot {
        settled: false,
        outcome: None,
        callback: None,
    }));
    (
        Request {
            slot: Arc::clone(&slot),
        },
        Responder {
            slot,
            settled: false,
        },
    )
}

impl<T> Request<T> {
    /// Register the completion callback.
    ///
    /// If the request already settled, the callback runs immediately on the
    /// caller's stack; otherwise it runs wherever the engine settles it.
    pub fn on_settled(self, callback: impl FnOnce(Result<T, EngineError>) + Send + 'static) {
        let outcome = {
            let mut slot = lock(&self.slot);
            match slot.outcome.take() {
                Some(outcome) => outcome,
                None => {
                    slot.callback = Some(Box::new(callback));
                    return;
                }
            }
        };
        callback(outcome);
    }

    pub fn is_settled(&self) -> bool {
        lock(&self.slot).settled
    }
}

impl<T> Responder<T> {
    pub fn succeed(mut self, value: T) {
        self.settle(Ok(value));
    }

    pub fn fail(mut self, error: EngineError) {
        self.settle(Err(error));
    }

    /// Settle with an already-built outcome.
    pub fn settle_with(mut self, outcome: Result<T, EngineError>) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: Result<T, EngineError>) {
        if self.settled {
            return;
        }
        self.settled = true;
        let callback = {
            let mut slot = lock(&self.slot);
            slot.settled = true;
            match slot.callback.take() {
                Some(callback) => callback,
                None => {
                    slot.outcome = Some(outcome);
                    return;
                }
            }
        };
        callback(outcome);
    }
}

impl<T> Drop for Responder<T> {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(Err(EngineError::Abandoned));
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn callback_registered_before_settlement_fires_once() {
        let (req, resp) = request::<u32>();
        let (tx, rx) = mpsc::channel();
        req.on_settled(move |r| tx.send(r).unwrap());
        assert!(rx.try_recv().is_err());
        resp.succeed(7);
        assert_eq!(rx.recv().unwrap(), Ok(7));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn callback_registered_after_settlement_fires_immediately() {
        let (req, resp) = request::<&'static str>();
        resp.fail(EngineError::ReadOnly);
        assert!(req.is_settled());
        let (tx, rx) = mpsc::channel();
        req.on_settled(move |r| tx.send(r).unwrap());
        assert_eq!(rx.recv().unwrap(), Err(EngineError::ReadOnly));
    }

    #[test]
    fn dropped_responder_abandons_request() {
        let (req, resp) = request::<()>();
        drop(resp);
        let (tx, rx) = mpsc::channel();
        req.on_settled(move |r| tx.send(r).unwrap());
        assert_eq!(rx.recv().unwrap(), Err(EngineError::Abandoned));
    }
}
