//! Transactional variables.
//!
//! A [`TVar`] is a single shared cell. At any instant it is either free,
//! holding a published value any thread may read, or locked by exactly one
//! committing transaction. The lock is a compare-and-set on an owner word;
//! it is held only for the validate-and-publish step of a commit, which
//! never calls user code, so every wait on it is a short spin.
//!
//! Values are stored as `Arc<T>` and replaced wholesale on every publish.
//! Pointer identity of that `Arc` is what commit validation and waiter
//! registration compare against: a transaction's snapshot keeps its `Arc`
//! alive, so the address cannot be reused while the comparison matters.

use crate::error::StmResult;
use crate::frame::FrameId;
use crate::transaction::with_current;
use crate::waiter::Waiter;
use crossbeam::utils::Backoff;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a TVar.
///
/// Ids are handed out from a process-wide counter, giving every TVar a
/// total order. Commits acquire their locks in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TVarId(u64);

impl TVarId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TVar({})", self.0)
    }
}

/// Owner word of a free cell.
const UNLOCKED: u64 = 0;

/// Shared state of a TVar.
pub(crate) struct TVarInner<T> {
    id: TVarId,
    /// `UNLOCKED`, or the id of the frame holding the commit lock.
    owner: AtomicU64,
    /// Published value. Written only by the lock owner.
    value: RwLock<Arc<T>>,
    /// Transactions blocked until this cell changes.
    waiters: Mutex<SmallVec<[Arc<Waiter>; 2]>>,
}

impl<T> TVarInner<T> {
    pub(crate) fn id(&self) -> TVarId {
        self.id
    }

    /// Read the published value, spinning while a commit holds the lock.
    pub(crate) fn unsafe_read(&self) -> Arc<T> {
        let backoff = Backoff::new();
        loop {
            if self.owner.load(Ordering::Acquire) == UNLOCKED {
                let value = Arc::clone(&self.value.read());
                if self.owner.load(Ordering::Acquire) == UNLOCKED {
                    return value;
                }
            }
            backoff.snooze();
        }
    }

    /// Take the commit lock for `frame`, returning the value it guards.
    pub(crate) fn lock(&self, frame: FrameId) -> Arc<T> {
        let backoff = Backoff::new();
        while self
            .owner
            .compare_exchange_weak(UNLOCKED, frame.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            backoff.snooze();
        }
        Arc::clone(&self.value.read())
    }

    /// Take the commit lock only if the cell still holds `expected`.
    ///
    /// On mismatch the lock is released again and `false` returned.
    pub(crate) fn lock_cond(&self, frame: FrameId, expected: &Arc<T>) -> bool {
        let current = self.lock(frame);
        if Arc::ptr_eq(&current, expected) {
            true
        } else {
            self.release(frame, current);
            false
        }
    }

    /// Publish `value` and drop the lock held by `frame`.
    ///
    /// Does nothing unless `frame` is the current owner.
    pub(crate) fn release(&self, frame: FrameId, value: Arc<T>) {
        if self.owner.load(Ordering::Acquire) != frame.raw() {
            return;
        }
        *self.value.write() = value;
        self.owner.store(UNLOCKED, Ordering::Release);
    }

    /// Register `waiter` if the cell still holds `expected`.
    ///
    /// The check and the insert happen under the waiter lock, and a commit
    /// publishes before it drains that lock, so a change can never slip in
    /// between a failed check and a missed notify.
    pub(crate) fn register_waiting(&self, waiter: &Arc<Waiter>, expected: &Arc<T>) -> bool {
        let mut waiters = self.waiters.lock();
        if !Arc::ptr_eq(&self.unsafe_read(), expected) {
            return false;
        }
        waiters.push(Arc::clone(waiter));
        true
    }

    pub(crate) fn remove_waiting(&self, waiter: &Arc<Waiter>) {
        self.waiters
            .lock()
            .retain(|registered| !Arc::ptr_eq(registered, waiter));
    }

    /// Drain the waiter set and wake every waiter.
    pub(crate) fn notify(&self) {
        let drained = std::mem::take(&mut *self.waiters.lock());
        for waiter in drained {
            waiter.wake();
        }
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

/// A transactional variable.
///
/// TVars are read and written inside [`atomically`](crate::atomically)
/// through [`read_tx`](TVar::read_tx) and [`write_tx`](TVar::write_tx).
/// Writes stay in the transaction log until commit. Cloning a `TVar` gives
/// another handle to the same cell.
pub struct TVar<T> {
    inner: Arc<TVarInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> TVar<T> {
    /// Create a new TVar with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(TVarInner {
                id: TVarId::next(),
                owner: AtomicU64::new(UNLOCKED),
                value: RwLock::new(Arc::new(value)),
                waiters: Mutex::new(SmallVec::new()),
            }),
        }
    }

    /// Get the TVar's unique identifier.
    #[must_use]
    pub fn id(&self) -> TVarId {
        self.inner.id
    }

    /// Read the published value outside of any transaction.
    ///
    /// This is a single-cell read with no isolation: it may race with a
    /// concurrent commit, and combining it with a later transaction as if
    /// the two were consistent is a bug.
    #[must_use]
    pub fn unsafe_read(&self) -> T {
        T::clone(&self.inner.unsafe_read())
    }

    /// Read the value within a transaction.
    ///
    /// The first read records a snapshot for commit validation. A value
    /// written earlier in the same transaction is returned as written.
    pub fn read_tx(&self) -> StmResult<T> {
        with_current(|tx| tx.read(&self.inner)).map(|value| T::clone(&value))
    }

    /// Write a value within a transaction.
    ///
    /// The write is buffered and only published if the transaction commits.
    pub fn write_tx(&self, value: T) -> StmResult<()> {
        with_current(|tx| tx.write(&self.inner, Arc::new(value)))
    }

    /// Apply `f` to the current value within a transaction.
    pub fn modify_tx(&self, f: impl FnOnce(T) -> T) -> StmResult<()> {
        let value = self.read_tx()?;
        self.write_tx(f(value))
    }

    /// Replace the value within a transaction, returning the old one.
    pub fn swap_tx(&self, value: T) -> StmResult<T> {
        let old = self.read_tx()?;
        self.write_tx(value)?;
        Ok(old)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<TVarInner<T>> {
        &self.inner
    }
}

impl<T> TVar<T> {
    /// Number of transactions currently blocked on this TVar.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.inner.waiter_count()
    }
}

impl<T> Clone for TVar<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for TVar<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for TVar<T> {}

impl<T> fmt::Debug for TVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TVar").field(&self.inner.id.0).finish()
    }
}

/// Create a TVar from inside a transaction.
///
/// The new cell is independent of the running transaction: it exists even
/// if the transaction later retries or aborts.
pub fn new_tvar<T: Clone + Send + Sync + 'static>(value: T) -> StmResult<TVar<T>> {
    with_current(|_| ())?;
    Ok(TVar::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StmError;
    use std::thread;
    use std::time::Duration;

    fn frame(raw: u64) -> FrameId {
        FrameId::from_raw(raw)
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let a = TVar::new(1);
        let b = TVar::new(2);
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
        assert_eq!(a.clone().id(), a.id());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_unsafe_read() {
        let var = TVar::new(String::from("hello"));
        assert_eq!(var.unsafe_read(), "hello");
    }

    #[test]
    fn test_lock_release_publishes() {
        let var = TVar::new(1);
        let inner = var.inner();

        let current = inner.lock(frame(7));
        assert_eq!(*current, 1);
        inner.release(frame(7), Arc::new(2));
        assert_eq!(var.unsafe_read(), 2);
    }

    #[test]
    fn test_release_by_non_owner_is_noop() {
        let var = TVar::new(1);
        let inner = var.inner();

        inner.lock(frame(7));
        inner.release(frame(8), Arc::new(99));
        inner.release(frame(7), Arc::new(2));
        // Double release.
        inner.release(frame(7), Arc::new(3));
        assert_eq!(var.unsafe_read(), 2);
    }

    #[test]
    fn test_lock_cond_detects_change() {
        let var = TVar::new(1);
        let inner = var.inner();
        let snapshot = inner.unsafe_read();

        inner.lock(frame(1));
        inner.release(frame(1), Arc::new(1));

        // Same value, different publish: identity changed.
        assert!(!inner.lock_cond(frame(2), &snapshot));
        assert_eq!(var.unsafe_read(), 1);

        let fresh = inner.unsafe_read();
        assert!(inner.lock_cond(frame(3), &fresh));
        inner.release(frame(3), fresh);
    }

    #[test]
    fn test_unsafe_read_spins_while_locked() {
        let var = TVar::new(0);
        let inner = Arc::clone(var.inner());
        inner.lock(frame(5));

        let reader = {
            let var = var.clone();
            thread::spawn(move || var.unsafe_read())
        };
        thread::sleep(Duration::from_millis(20));
        inner.release(frame(5), Arc::new(42));

        assert_eq!(reader.join().unwrap(), 42);
    }

    #[test]
    fn test_register_waiting_checks_value() {
        let var = TVar::new(0);
        let inner = var.inner();
        let stale = inner.unsafe_read();

        inner.lock(frame(1));
        inner.release(frame(1), Arc::new(1));

        let waiter = Waiter::new();
        assert!(!inner.register_waiting(&waiter, &stale));
        assert_eq!(var.waiter_count(), 0);

        let current = inner.unsafe_read();
        assert!(inner.register_waiting(&waiter, &current));
        assert_eq!(var.waiter_count(), 1);

        inner.remove_waiting(&waiter);
        assert_eq!(var.waiter_count(), 0);
    }

    #[test]
    fn test_notify_drains_waiters() {
        let var = TVar::new(0);
        let inner = var.inner();
        let current = inner.unsafe_read();

        let a = Waiter::new();
        let b = Waiter::new();
        assert!(inner.register_waiting(&a, &current));
        assert!(inner.register_waiting(&b, &current));
        assert_eq!(var.waiter_count(), 2);

        inner.notify();
        assert_eq!(var.waiter_count(), 0);
    }

    #[test]
    fn test_tx_ops_outside_transaction() {
        let var = TVar::new(0);
        assert!(matches!(var.read_tx(), Err(StmError::NotInTransaction)));
        assert!(matches!(var.write_tx(1), Err(StmError::NotInTransaction)));
        assert!(matches!(new_tvar(1), Err(StmError::NotInTransaction)));
        assert_eq!(var.unsafe_read(), 0);
    }
}
