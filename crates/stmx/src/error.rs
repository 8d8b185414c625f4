//! Transaction errors.
//!
//! A transactional action returns [`StmResult`]. Two variants are control
//! flow rather than failures: [`StmError::Retry`] is consumed by the runner
//! (the calling thread blocks and re-runs the action), and conflicts never
//! appear here at all. Everything else reaches the caller of
//! [`try_atomically`](crate::try_atomically) exactly once.

use std::error::Error;
use thiserror::Error;

/// Boxed user error carried by [`StmError::Abort`].
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result type for STM operations.
pub type StmResult<T> = Result<T, StmError>;

/// Errors that can occur in STM operations.
#[derive(Debug, Error)]
pub enum StmError {
    /// A transactional operation was called outside of a transaction.
    #[error("STM operation performed outside a transaction")]
    NotInTransaction,

    /// The transaction asked to block until one of its reads changes.
    #[error("transaction requested retry")]
    Retry,

    /// The transaction aborted with a user error. Its writes are discarded.
    #[error("transaction aborted: {0}")]
    Abort(BoxError),

    /// The transaction retried without reading any TVar, so nothing could
    /// ever wake it.
    #[error("transaction blocked indefinitely: retry without any transactional reads")]
    BlockedIndefinitely,

    /// A transaction was started on a thread already running one.
    #[error("atomically called from inside another transaction")]
    NestedTransaction,

    /// The transaction was cancelled through its cancel token.
    #[error("transaction cancelled")]
    Cancelled,
}

impl StmError {
    /// Wrap a user error as an abort.
    pub fn abort(err: impl Into<BoxError>) -> Self {
        StmError::Abort(err.into())
    }

    /// Check if this is the retry signal.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, StmError::Retry)
    }

    /// Borrow the aborting user error as a concrete type, if it is one.
    #[must_use]
    pub fn abort_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            StmError::Abort(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Take the aborting user error out as a concrete type.
    ///
    /// Returns `self` unchanged if this is not an abort of type `E`.
    pub fn into_abort<E: Error + 'static>(self) -> Result<E, Self> {
        match self {
            StmError::Abort(err) => err.downcast::<E>().map(|e| *e).map_err(StmError::Abort),
            other => Err(other),
        }
    }
}
