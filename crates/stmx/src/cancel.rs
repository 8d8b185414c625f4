//! Cooperative cancellation for blocked transactions.
//!
//! A transaction parked in retry is the only place the engine waits. A
//! [`CancelToken`] passed to [`atomically_with`](crate::atomically_with) lets
//! another thread end that wait: the runner wakes, removes its waiter from
//! every TVar it was registered on, and returns
//! [`StmError::Cancelled`](crate::StmError::Cancelled). Nothing was published,
//! so there is nothing to roll back.
//!
//! # Example
//!
//! ```
//! use stmx::{atomically_with, retry, CancelToken, StmError, TVar};
//! use std::thread;
//!
//! let flag = TVar::new(false);
//! let token = CancelToken::new();
//!
//! let waiter = {
//!     let (flag, token) = (flag.clone(), token.clone());
//!     thread::spawn(move || {
//!         atomically_with(&token, || if flag.read_tx()? { Ok(()) } else { retry() })
//!     })
//! };
//!
//! token.cancel();
//! assert!(matches!(waiter.join().unwrap(), Err(StmError::Cancelled)));
//! ```

use crate::waiter::Waiter;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shareable cancellation flag for transactions.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    /// Waiters currently parked under this token.
    parked: Mutex<SmallVec<[Arc<Waiter>; 1]>>,
}

impl CancelToken {
    /// Create a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every transaction running under this token.
    ///
    /// Parked transactions wake immediately; running ones observe the
    /// cancellation before their next attempt or park.
    pub fn cancel(&self) {
        let parked = {
            let mut parked = self.inner.parked.lock();
            self.inner.cancelled.store(true, Ordering::Release);
            std::mem::take(&mut *parked)
        };
        for waiter in parked {
            waiter.wake();
        }
    }

    /// Check if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Track a waiter about to park. Returns `false` if already cancelled.
    pub(crate) fn attach(&self, waiter: &Arc<Waiter>) -> bool {
        let mut parked = self.inner.parked.lock();
        if self.is_cancelled() {
            return false;
        }
        parked.push(Arc::clone(waiter));
        true
    }

    /// Stop tracking a waiter once it has woken.
    pub(crate) fn detach(&self, waiter: &Arc<Waiter>) {
        self.inner
            .parked
            .lock()
            .retain(|parked| !Arc::ptr_eq(parked, waiter));
    }

    #[cfg(test)]
    pub(crate) fn parked_count(&self) -> usize {
        self.inner.parked.lock().len()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_attach_detach() {
        let token = CancelToken::new();
        let waiter = Waiter::new();

        assert!(token.attach(&waiter));
        assert_eq!(token.parked_count(), 1);
        token.detach(&waiter);
        assert_eq!(token.parked_count(), 0);
    }

    #[test]
    fn test_cancel_drains_parked() {
        let token = CancelToken::new();
        let waiter = Waiter::new();
        assert!(token.attach(&waiter));

        token.cancel();
        assert_eq!(token.parked_count(), 0);
        assert!(!token.attach(&waiter));
    }
}
