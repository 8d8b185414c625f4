//! The transaction runner.
//!
//! Each call to [`atomically`] runs the user action in a loop of attempts.
//! An attempt installs a fresh [`Transaction`] in thread-local storage; TVar
//! reads and writes go through it and never touch the cells directly. When
//! the action returns, the attempt resolves to exactly one outcome:
//!
//! ```text
//!            +---------+   Ok, validated   +-----------+
//!  start --> | execute | ----------------> | committed |
//!    ^       +---------+                   +-----------+
//!    |         |  |  |
//!    |         |  |  +-- Err(Abort), validated --> returned to caller
//!    |         |  |
//!    |         |  +-- Err(Retry) --> register waiters --> park --+
//!    |         |                        | changed already        |
//!    +---------+------ conflict --------+------------------------+
//! ```
//!
//! An abort or a panic is only passed on once the read set still matches
//! the TVars; otherwise it may come from a torn view, and the attempt counts
//! as a conflict instead.
//!
//! Commit locks every logged TVar in id order, each conditioned on the
//! snapshot taken at first access. If all locks succeed the pending values
//! are published and every touched TVar notifies its waiters. A failed lock
//! means another commit got there first: everything locked so far is
//! restored and the attempt starts over with an empty log.

use crate::cancel::CancelToken;
use crate::config::{self, bump, Counter};
use crate::error::{BoxError, StmError, StmResult};
use crate::frame::{Entry, Frame, FrameId, LogEntry};
use crate::tvar::{TVarId, TVarInner};
use crate::waiter::{Waiter, Wakeup};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ============================================================================
// Transaction State
// ============================================================================

/// State of one attempt: a stack of frames, root first.
pub(crate) struct Transaction {
    id: FrameId,
    frames: Vec<Frame>,
}

impl Transaction {
    fn new() -> Self {
        Self {
            id: FrameId::next(),
            frames: vec![Frame::new()],
        }
    }

    fn top_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => unreachable!("transaction without a root frame"),
        }
    }

    /// The innermost entry for a TVar, searching from the top frame down.
    fn lookup<T: Send + Sync + 'static>(&self, tvar: &TVarInner<T>) -> Option<&Entry<T>> {
        let id = tvar.id();
        self.frames.iter().rev().find_map(|frame| frame.get::<T>(id))
    }

    fn is_logged(&self, id: TVarId) -> bool {
        self.frames.iter().any(|frame| frame.contains(id))
    }

    /// Read a TVar within this transaction.
    pub(crate) fn read<T: Send + Sync + 'static>(&mut self, tvar: &Arc<TVarInner<T>>) -> Arc<T> {
        if let Some(entry) = self.lookup(tvar) {
            return Arc::clone(entry.pending());
        }
        let value = tvar.unsafe_read();
        self.top_mut()
            .insert(tvar.id(), Entry::new(tvar, Arc::clone(&value), Arc::clone(&value)));
        value
    }

    /// Buffer a write to a TVar.
    pub(crate) fn write<T: Send + Sync + 'static>(&mut self, tvar: &Arc<TVarInner<T>>, value: Arc<T>) {
        let id = tvar.id();
        if let Some(entry) = self.top_mut().get_mut::<T>(id) {
            entry.set_pending(value);
            return;
        }
        // Copy an outer frame's entry so the snapshot stays the one
        // validated at commit; otherwise this write is the first touch.
        let entry = match self.lookup(tvar) {
            Some(outer) => outer.with_pending(value),
            None => Entry::new(tvar, tvar.unsafe_read(), value),
        };
        self.top_mut().insert(id, entry);
    }

    fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pop the top frame and fold all of it into its parent.
    fn merge_child(&mut self) {
        if let Some(child) = self.pop_child() {
            let parent = self.top_mut();
            for (id, entry) in child.into_entries() {
                parent.insert_erased(id, entry);
            }
        }
    }

    /// Pop the top frame, dropping its writes but keeping its first reads.
    ///
    /// Only TVars no enclosing frame has logged are kept, as read-only
    /// entries, so the blocked transaction still waits on them.
    fn discard_child(&mut self) {
        if let Some(child) = self.pop_child() {
            for (id, entry) in child.into_entries() {
                if !self.is_logged(id) {
                    self.top_mut().insert_erased(id, entry.reads_only());
                }
            }
        }
    }

    fn pop_child(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    fn into_root(mut self) -> Frame {
        self.frames.truncate(1);
        self.frames.pop().unwrap_or_default()
    }

    /// Validate and publish. Returns `false` on conflict.
    fn commit(self) -> bool {
        let id = self.id;
        let root = self.into_root();
        trace!(
            frame = id.raw(),
            touched = root.len(),
            writes = root.write_count(),
            "validating"
        );
        let entries = root.into_sorted();

        for (locked, entry) in entries.iter().enumerate() {
            if !entry.lock_cond(id) {
                for held in &entries[..locked] {
                    held.unlock(id);
                }
                return false;
            }
        }
        for entry in &entries {
            entry.publish(id);
        }
        for entry in &entries {
            entry.notify();
        }
        true
    }

    /// Check that every logged TVar still holds its snapshot.
    ///
    /// Used before handing an abort or panic to the caller, so that only
    /// failures raised from a consistent view escape. Each TVar is locked and
    /// released on its own; nothing is published.
    fn validate(self) -> bool {
        let id = self.id;
        let root = self.into_root();
        let valid = root.entries().all(|entry| {
            let current = entry.lock_cond(id);
            if current {
                entry.unlock(id);
            }
            current
        });
        valid
    }

    /// Park until a TVar read by this attempt changes.
    fn block(self, cancel: Option<&CancelToken>, config: &config::StmConfig) -> Blocked {
        let root = self.into_root();
        if root.is_empty() {
            return Blocked::Never;
        }
        let entries: Vec<&dyn LogEntry> = root.entries().collect();
        let waiter = Waiter::new();

        for (registered, entry) in entries.iter().enumerate() {
            if !entry.register_waiting(&waiter) {
                for done in &entries[..registered] {
                    done.remove_waiting(&waiter);
                }
                trace!("read set changed before parking");
                return Blocked::Woken;
            }
        }

        bump(Counter::Block);
        debug!(tvars = entries.len(), "transaction blocked in retry");
        let wakeup = waiter.park(cancel, config.park_timeout);
        for entry in &entries {
            entry.remove_waiting(&waiter);
        }

        match wakeup {
            Wakeup::Notified => {
                bump(Counter::Wakeup);
                Blocked::Woken
            }
            Wakeup::TimedOut => Blocked::Woken,
            Wakeup::Cancelled => Blocked::Cancelled,
        }
    }
}

/// Result of parking a retried attempt.
enum Blocked {
    Woken,
    Cancelled,
    Never,
}

/// Conflict count for one `atomically` call.
struct Contention {
    conflicts: u32,
    warn_at: u32,
}

impl Contention {
    fn new(warn_at: u32) -> Self {
        Self {
            conflicts: 0,
            warn_at,
        }
    }

    /// Count a conflict. Returns `true` once, when the warning threshold is
    /// first reached.
    fn record(&mut self) -> bool {
        let before = self.conflicts;
        self.conflicts = before.saturating_add(1);
        before < self.warn_at && self.conflicts >= self.warn_at
    }
}

// ============================================================================
// Thread-Local Storage
// ============================================================================

thread_local! {
    /// The attempt running on this thread, if any.
    static CURRENT_TX: RefCell<Option<Transaction>> = const { RefCell::new(None) };
}

/// Run `f` against the current transaction.
pub(crate) fn with_current<R>(f: impl FnOnce(&mut Transaction) -> R) -> StmResult<R> {
    CURRENT_TX.with(|tx| {
        let mut tx = tx.borrow_mut();
        let tx = tx.as_mut().ok_or(StmError::NotInTransaction)?;
        Ok(f(tx))
    })
}

/// Check if the current thread is running a transaction.
#[must_use]
pub fn in_transaction() -> bool {
    CURRENT_TX.with(|tx| tx.borrow().is_some())
}

/// Installs an attempt for the current thread and clears it again on drop,
/// including when the user action panics.
struct Attempt;

impl Attempt {
    fn begin() -> Self {
        CURRENT_TX.with(|tx| *tx.borrow_mut() = Some(Transaction::new()));
        Attempt
    }

    fn finish(self) -> Option<Transaction> {
        CURRENT_TX.with(|tx| tx.borrow_mut().take())
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        CURRENT_TX.with(|tx| {
            if let Ok(mut tx) = tx.try_borrow_mut() {
                tx.take();
            }
        });
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Execute a transaction atomically.
///
/// The transaction is re-run on conflicts with concurrent transactions. If
/// it calls [`retry`], the thread blocks until one of the TVars it read
/// changes. A panic inside `f` propagates unchanged and nothing is
/// published.
///
/// # Panics
///
/// Panics if the transaction aborts, blocks indefinitely, or is started
/// from inside another transaction. The panic payload is the [`StmError`]
/// itself, so an abort value can be recovered with `downcast` and
/// [`StmError::into_abort`]. Use [`try_atomically`] to get those as errors.
///
/// # Example
///
/// ```
/// use stmx::{atomically, TVar};
///
/// let counter = TVar::new(0);
/// atomically(|| counter.modify_tx(|n| n + 1));
/// assert_eq!(counter.unsafe_read(), 1);
/// ```
pub fn atomically<T, F>(f: F) -> T
where
    F: Fn() -> StmResult<T>,
{
    match run(f, None) {
        Ok(value) => value,
        Err(err) => panic::panic_any(err),
    }
}

/// Execute a transaction atomically, returning failures as errors.
///
/// Conflicts and retries are handled internally and never returned. The
/// error is [`StmError::Abort`] carrying exactly what the transaction
/// aborted with, [`StmError::BlockedIndefinitely`] for a retry with no
/// reads, or [`StmError::NestedTransaction`] when called inside another
/// transaction.
pub fn try_atomically<T, F>(f: F) -> StmResult<T>
where
    F: Fn() -> StmResult<T>,
{
    run(f, None)
}

/// Execute a transaction atomically under a cancel token.
///
/// Behaves like [`try_atomically`], and additionally returns
/// [`StmError::Cancelled`] once `token` is cancelled, whether the
/// transaction is parked in retry or about to start an attempt.
pub fn atomically_with<T, F>(token: &CancelToken, f: F) -> StmResult<T>
where
    F: Fn() -> StmResult<T>,
{
    run(f, Some(token))
}

fn run<T, F>(f: F, cancel: Option<&CancelToken>) -> StmResult<T>
where
    F: Fn() -> StmResult<T>,
{
    if in_transaction() {
        return Err(StmError::NestedTransaction);
    }
    let config = config::config();
    let mut contention = Contention::new(config.contention_warning);

    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            bump(Counter::Cancellation);
            debug!("transaction cancelled before attempt");
            return Err(StmError::Cancelled);
        }

        let attempt = Attempt::begin();
        let outcome = panic::catch_unwind(AssertUnwindSafe(&f));
        let Some(tx) = attempt.finish() else {
            unreachable!("transaction state removed during attempt");
        };
        let frame = tx.id;

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                if tx.validate() {
                    debug!(frame = frame.raw(), "transaction panicked");
                    panic::resume_unwind(payload);
                }
                trace!(frame = frame.raw(), "panic raised from an inconsistent view");
                record_conflict(&mut contention, frame);
                continue;
            }
        };

        match result {
            Ok(value) => {
                if tx.commit() {
                    bump(Counter::Commit);
                    trace!(
                        frame = frame.raw(),
                        conflicts = contention.conflicts,
                        "transaction committed"
                    );
                    return Ok(value);
                }
                record_conflict(&mut contention, frame);
            }
            Err(StmError::Retry) => match tx.block(cancel, &config) {
                Blocked::Woken => continue,
                Blocked::Cancelled => {
                    bump(Counter::Cancellation);
                    debug!("blocked transaction cancelled");
                    return Err(StmError::Cancelled);
                }
                Blocked::Never => return Err(StmError::BlockedIndefinitely),
            },
            Err(err) => {
                if !tx.validate() {
                    trace!(
                        frame = frame.raw(),
                        error = %err,
                        "error raised from an inconsistent view"
                    );
                    record_conflict(&mut contention, frame);
                    continue;
                }
                if matches!(err, StmError::Abort(_)) {
                    bump(Counter::Abort);
                }
                debug!(error = %err, "transaction failed");
                return Err(err);
            }
        }
    }
}

fn record_conflict(contention: &mut Contention, frame: FrameId) {
    let warn = contention.record();
    bump(Counter::Conflict);
    debug!(
        frame = frame.raw(),
        conflicts = contention.conflicts,
        "read set invalidated, restarting"
    );
    if warn {
        warn!(
            conflicts = contention.conflicts,
            "transaction is starving under contention"
        );
    }
}

/// Retry the current transaction.
///
/// The attempt is abandoned and the thread blocks until one of the TVars
/// it has read changes, then the transaction starts over.
///
/// # Example
///
/// ```
/// use stmx::{atomically, or_else, retry};
///
/// let value = atomically(|| or_else(retry, || Ok("alternative")));
/// assert_eq!(value, "alternative");
/// ```
pub fn retry<T>() -> StmResult<T> {
    Err(StmError::Retry)
}

/// Check a condition; retry if false.
pub fn check(condition: bool) -> StmResult<()> {
    if condition {
        Ok(())
    } else {
        retry()
    }
}

/// Abort the current transaction with a user error.
///
/// The transaction's writes are discarded and the error is returned by
/// [`try_atomically`].
pub fn abort<T>(err: impl Into<BoxError>) -> StmResult<T> {
    Err(StmError::abort(err))
}

/// Run `f` in a child frame, folding the frame back into its parent.
///
/// On success the child's reads and writes join the parent. On any error
/// its writes are dropped and its reads kept.
fn nested<T>(f: impl FnOnce() -> StmResult<T>) -> StmResult<T> {
    with_current(Transaction::push_frame)?;
    let result = f();
    match result {
        Ok(_) => with_current(Transaction::merge_child)?,
        Err(_) => with_current(Transaction::discard_child)?,
    }
    result
}

/// Try the first action; if it retries, try the second.
///
/// Writes made by `first` before it retried are discarded. Its reads are
/// kept, so if `second` retries too the transaction waits on both. If
/// `first` succeeds or fails, `second` never runs.
///
/// # Example
///
/// ```
/// use stmx::{atomically, or_else, retry, TVar};
///
/// let primary: TVar<Option<u32>> = TVar::new(None);
/// let backup = TVar::new(Some(7));
///
/// let taken = atomically(|| {
///     or_else(
///         || primary.read_tx()?.map_or_else(retry, Ok),
///         || backup.read_tx()?.map_or_else(retry, Ok),
///     )
/// });
/// assert_eq!(taken, 7);
/// ```
pub fn or_else<T, F, G>(first: F, second: G) -> StmResult<T>
where
    F: FnOnce() -> StmResult<T>,
    G: FnOnce() -> StmResult<T>,
{
    match nested(first) {
        Err(StmError::Retry) => nested(second),
        result => result,
    }
}

/// Run `f`, handling an abort with `handler`.
///
/// If `f` aborts, its writes are discarded and `handler` runs in the
/// enclosing frame with the error. Retries propagate unchanged.
pub fn catch_abort<T, F, H>(f: F, handler: H) -> StmResult<T>
where
    F: FnOnce() -> StmResult<T>,
    H: FnOnce(BoxError) -> StmResult<T>,
{
    match nested(f) {
        Err(StmError::Abort(err)) => handler(err),
        result => result,
    }
}

/// Run `f`, turning a retry into `None`.
pub fn optionally<T, F>(f: F) -> StmResult<Option<T>>
where
    F: FnOnce() -> StmResult<T>,
{
    or_else(|| f().map(Some), || Ok(None))
}

/// Unwrap an `Option`, retrying if it is `None`.
pub fn unwrap_or_retry<T>(option: Option<T>) -> StmResult<T> {
    option.map_or_else(retry, Ok)
}

// ============================================================================
// Tests
// ============================================================================
