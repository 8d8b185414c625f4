//! Transactional MVars.
//!
//! A [`TMVar`] is a box that is either empty or holds one value. Taking
//! from an empty box or putting into a full one retries, which makes it a
//! one-slot channel or a lock depending on how it is used.

use std::fmt;
use stmx::{new_tvar, retry, StmResult, TVar};

/// A transactional MVar (mutable variable that can be empty).
pub struct TMVar<T> {
    inner: TVar<Option<T>>,
}

impl<T: Clone + Send + Sync + 'static> TMVar<T> {
    /// Create a new TMVar with a value.
    pub fn new(value: T) -> Self {
        Self {
            inner: TVar::new(Some(value)),
        }
    }

    /// Create an empty TMVar.
    pub fn new_empty() -> Self {
        Self {
            inner: TVar::new(None),
        }
    }

    /// Create a full TMVar inside a transaction.
    pub fn new_tx(value: T) -> StmResult<Self> {
        Ok(Self {
            inner: new_tvar(Some(value))?,
        })
    }

    /// Create an empty TMVar inside a transaction.
    pub fn new_empty_tx() -> StmResult<Self> {
        Ok(Self {
            inner: new_tvar(None)?,
        })
    }

    /// Take the value, retrying while empty.
    pub fn take(&self) -> StmResult<T> {
        match self.try_take()? {
            Some(value) => Ok(value),
            None => retry(),
        }
    }

    /// Put a value, retrying while full.
    pub fn put(&self, value: T) -> StmResult<()> {
        if self.try_put(value)? {
            Ok(())
        } else {
            retry()
        }
    }

    /// Read the value without taking it, retrying while empty.
    pub fn read(&self) -> StmResult<T> {
        match self.inner.read_tx()? {
            Some(value) => Ok(value),
            None => retry(),
        }
    }

    /// Take the value if there is one.
    pub fn try_take(&self) -> StmResult<Option<T>> {
        let value = self.inner.read_tx()?;
        if value.is_some() {
            self.inner.write_tx(None)?;
        }
        Ok(value)
    }

    /// Put a value if the TMVar is empty. Returns whether it was put.
    pub fn try_put(&self, value: T) -> StmResult<bool> {
        if self.inner.read_tx()?.is_some() {
            return Ok(false);
        }
        self.inner.write_tx(Some(value))?;
        Ok(true)
    }

    /// Read the value without taking it, if there is one.
    pub fn try_read(&self) -> StmResult<Option<T>> {
        self.inner.read_tx()
    }

    /// Replace the value, returning the old one. Retries while empty.
    pub fn swap(&self, value: T) -> StmResult<T> {
        match self.inner.read_tx()? {
            Some(old) => {
                self.inner.write_tx(Some(value))?;
                Ok(old)
            }
            None => retry(),
        }
    }

    /// Check if empty.
    pub fn is_empty(&self) -> StmResult<bool> {
        Ok(self.inner.read_tx()?.is_none())
    }

    /// Check if full.
    pub fn is_not_empty(&self) -> StmResult<bool> {
        Ok(self.inner.read_tx()?.is_some())
    }
}

impl<T> Clone for TMVar<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for TMVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TMVar").field("inner", &self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, RecvTimeoutError};
    use std::thread;
    use std::time::Duration;
    use stmx::{atomically, try_atomically, StmError};

    #[test]
    fn test_take_put() {
        let mvar = TMVar::new(42);
        assert_eq!(atomically(|| mvar.take()), 42);
        assert!(atomically(|| mvar.is_empty()));

        atomically(|| mvar.put(7));
        assert!(atomically(|| mvar.is_not_empty()));
        assert_eq!(atomically(|| mvar.read()), 7);
        assert_eq!(atomically(|| mvar.take()), 7);
    }

    #[test]
    fn test_try_ops() {
        let mvar: TMVar<i32> = TMVar::new_empty();
        assert_eq!(atomically(|| mvar.try_take()), None);
        assert_eq!(atomically(|| mvar.try_read()), None);
        assert!(atomically(|| mvar.try_put(1)));
        assert!(!atomically(|| mvar.try_put(2)));
        assert_eq!(atomically(|| mvar.try_read()), Some(1));
        assert_eq!(atomically(|| mvar.try_take()), Some(1));
    }

    #[test]
    fn test_swap() {
        let mvar = TMVar::new("old");
        assert_eq!(atomically(|| mvar.swap("new")), "old");
        assert_eq!(atomically(|| mvar.read()), "new");
    }

    #[test]
    fn test_take_aborts_cleanly_on_error() {
        let mvar = TMVar::new(10);
        let result: Result<(), _> = try_atomically(|| {
            mvar.take()?;
            stmx::abort("rejected")
        });
        assert!(matches!(result, Err(StmError::Abort(_))));
        assert_eq!(atomically(|| mvar.read()), 10);
    }

    #[test]
    fn test_take_blocks_until_put() {
        let mvar: TMVar<u32> = TMVar::new_empty();
        let (done_tx, done_rx) = bounded(1);

        {
            let mvar = mvar.clone();
            thread::spawn(move || {
                done_tx.send(atomically(|| mvar.take())).ok();
            });
        }

        assert_eq!(
            done_rx.recv_timeout(Duration::from_millis(100)),
            Err(RecvTimeoutError::Timeout)
        );
        atomically(|| mvar.put(5));
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(5));
    }

    #[test]
    fn test_put_blocks_until_take() {
        let mvar = TMVar::new(1);
        let (done_tx, done_rx) = bounded(1);

        {
            let mvar = mvar.clone();
            thread::spawn(move || {
                atomically(|| mvar.put(2));
                done_tx.send(()).ok();
            });
        }

        assert_eq!(
            done_rx.recv_timeout(Duration::from_millis(100)),
            Err(RecvTimeoutError::Timeout)
        );
        assert_eq!(atomically(|| mvar.take()), 1);
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(()));
        assert_eq!(atomically(|| mvar.read()), 2);
    }

    #[test]
    fn test_new_tx() {
        let full = atomically(|| TMVar::new_tx(3));
        let empty = atomically(TMVar::<i32>::new_empty_tx);
        assert_eq!(atomically(|| full.take()), 3);
        assert!(atomically(|| empty.is_empty()));
    }
}
