//! Lazy, single-pass scans over a store or index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use tracing::warn;

use larder_store::{Cursor as EngineCursor, CursorEntry, EngineError};

use crate::gateway::await_request;
use crate::lease::LeaseToken;
use crate::{Operation, SessionError, Target};

/// A scan bound to the transaction it was opened on.
///
/// Each [`Cursor::next`] issues one engine step. The cursor is valid only
/// while that transaction is open; stepping it afterwards fails with
/// [`SessionError::StaleCursor`].
pub struct Cursor {
    inner: Arc<dyn EngineCursor>,
    token: LeaseToken,
    session_closed: Arc<AtomicBool>,
    store: String,
    target: Target,
    exhausted: bool,
}

impl Cursor {
    pub(crate) fn new(
        inner: Arc<dyn EngineCursor>,
        token: LeaseToken,
        session_closed: Arc<AtomicBool>,
        store: String,
        target: Target,
    ) -> Self {
        Self {
            inner,
            token,
            session_closed,
            store,
            target,
            exhausted: false,
        }
    }

    /// The next entry, or `None` once the scan is exhausted.
    ///
    /// A closed session takes precedence: stepping after
    /// [`StoreSession::close`](crate::StoreSession::close) fails with
    /// [`SessionError::StaleCursor`] even if the scan already ended. An
    /// exhausted cursor otherwise keeps returning `None` after its
    /// transaction finishes.
    pub async fn next(&mut self) -> Result<Option<CursorEntry>, SessionError> {
        if self.session_closed.load(Ordering::Acquire) {
            return Err(self.stale());
        }
        if self.exhausted {
            return Ok(None);
        }
        if !self.token.is_open() {
            return Err(self.stale());
        }

        let request = match self.inner.advance() {
            Ok(request) => request,
            Err(EngineError::TransactionInactive) => {
                self.token.close();
                return Err(self.stale());
            }
            Err(source) => return Err(self.step_error(source)),
        };
        match await_request(request).await {
            Ok(Some(entry)) => Ok(Some(entry)),
            Ok(None) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(source) => Err(self.step_error(source)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Drain the remaining entries into a vector.
    pub async fn collect(mut self) -> Result<Vec<CursorEntry>, SessionError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// The remaining entries as a stream. The stream ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<CursorEntry, SessionError>> {
        stream::unfold(Some(self), |state| async move {
            let mut cursor = state?;
            match cursor.next().await {
                Ok(Some(entry)) => Some((Ok(entry), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn stale(&self) -> SessionError {
        SessionError::StaleCursor {
            store: self.store.clone(),
        }
    }

    fn step_error(&self, source: EngineError) -> SessionError {
        warn!(
            store = %self.store,
            op = %Operation::CursorStep,
            target = %self.target,
            error = %source,
            "cursor step failed"
        );
        SessionError::Engine {
            op: Operation::CursorStep,
            store: self.store.clone(),
            target: self.target.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_store::request;

    /// Settles every step with the same engine failure.
    struct FailingCursor;

    impl EngineCursor for FailingCursor {
        fn advance(&self) -> Result<larder_store::Request<Option<CursorEntry>>, EngineError> {
            let (request, responder) = request();
            responder.fail(EngineError::Data("corrupt record".into()));
            Ok(request)
        }
    }

    fn failing_cursor() -> Cursor {
        Cursor::new(
            Arc::new(FailingCursor),
            LeaseToken::new(),
            Arc::new(AtomicBool::new(false)),
            "fruit".into(),
            Target::Range(None),
        )
    }

    #[tokio::test]
    async fn failed_step_reports_cursor_step() {
        let mut cursor = failing_cursor();
        let err = cursor.next().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Engine { op: Operation::CursorStep, ref store, .. } if store == "fruit"
        ));
        assert_eq!(err.engine_error(), Some(&EngineError::Data("corrupt record".into())));
        assert!(!cursor.is_exhausted());
    }

    #[tokio::test]
    async fn closed_session_is_checked_before_stepping() {
        let mut cursor = failing_cursor();
        cursor.session_closed.store(true, Ordering::Release);
        assert!(matches!(cursor.next().await, Err(SessionError::StaleCursor { .. })));
    }
}
