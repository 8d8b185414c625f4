//! Transactional FIFO queues.
//!
//! A [`TQueue`] is two persistent lists, each in its own TVar. Writers cons
//! onto the write end; readers pop from the read end. When the read end runs
//! dry the write end is reversed into it. Producers and consumers therefore
//! touch different TVars whenever the read end is non-empty, and do not
//! conflict with each other.
//!
//! # Example
//!
//! ```
//! use stmx::atomically;
//! use stmx_containers::TQueue;
//!
//! let queue = TQueue::new();
//! atomically(|| {
//!     queue.write(1)?;
//!     queue.write(2)
//! });
//! assert_eq!(atomically(|| queue.read()), 1);
//! assert_eq!(atomically(|| queue.flush()), vec![2]);
//! ```

use crate::plist::PList;
use std::fmt;
use stmx::{new_tvar, optionally, retry, StmResult, TVar};

/// A transactional FIFO queue.
pub struct TQueue<T> {
    /// Head first.
    reads: TVar<PList<T>>,
    /// Most recent write first.
    writes: TVar<PList<T>>,
}

impl<T: Clone + Send + Sync + 'static> TQueue<T> {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            reads: TVar::new(PList::new()),
            writes: TVar::new(PList::new()),
        }
    }

    /// Create an empty queue inside a transaction.
    pub fn new_tx() -> StmResult<Self> {
        Ok(Self {
            reads: new_tvar(PList::new())?,
            writes: new_tvar(PList::new())?,
        })
    }

    /// Append a value to the back of the queue.
    pub fn write(&self, value: T) -> StmResult<()> {
        self.writes.modify_tx(|writes| writes.cons(value))
    }

    /// Push a value onto the front, so it is the next one read.
    pub fn write_front(&self, value: T) -> StmResult<()> {
        self.reads.modify_tx(|reads| reads.cons(value))
    }

    /// Remove and return the front value, retrying while empty.
    pub fn read(&self) -> StmResult<T> {
        if let Some((value, rest)) = self.reads.read_tx()?.uncons() {
            self.reads.write_tx(rest)?;
            return Ok(value);
        }

        let writes = self.writes.read_tx()?;
        if writes.is_empty() {
            return retry();
        }
        self.writes.write_tx(PList::new())?;
        let reversed = writes.reverse();
        let value = reversed.head()?.clone();
        self.reads.write_tx(reversed.tail()?)?;
        Ok(value)
    }

    /// Like [`read`](Self::read), returning `None` instead of retrying.
    pub fn try_read(&self) -> StmResult<Option<T>> {
        optionally(|| self.read())
    }

    /// Return the front value without removing it, retrying while empty.
    pub fn peek(&self) -> StmResult<T> {
        let value = self.read()?;
        self.write_front(value.clone())?;
        Ok(value)
    }

    /// Like [`peek`](Self::peek), returning `None` instead of retrying.
    pub fn try_peek(&self) -> StmResult<Option<T>> {
        optionally(|| self.peek())
    }

    /// Remove every value, returned front first. Never retries.
    pub fn flush(&self) -> StmResult<Vec<T>> {
        let reads = self.reads.read_tx()?;
        let writes = self.writes.read_tx()?;
        if !reads.is_empty() {
            self.reads.write_tx(PList::new())?;
        }
        if !writes.is_empty() {
            self.writes.write_tx(PList::new())?;
        }

        let mut values = reads.to_vec();
        values.extend(writes.reverse().iter().cloned());
        Ok(values)
    }

    /// Keep only the values for which `pred` holds, preserving order.
    pub fn retain(&self, mut pred: impl FnMut(&T) -> bool) -> StmResult<()> {
        self.reads.modify_tx(|reads| reads.filter(&mut pred))?;
        self.writes.modify_tx(|writes| writes.filter(&mut pred))
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> StmResult<bool> {
        Ok(self.reads.read_tx()?.is_empty() && self.writes.read_tx()?.is_empty())
    }

    /// Check if the queue has at least one value.
    pub fn is_not_empty(&self) -> StmResult<bool> {
        Ok(!self.is_empty()?)
    }

    /// Number of values in the queue.
    pub fn size(&self) -> StmResult<usize> {
        Ok(self.reads.read_tx()?.len() + self.writes.read_tx()?.len())
    }
}

impl<T: Clone + Send + Sync + 'static> Default for TQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TQueue<T> {
    fn clone(&self) -> Self {
        Self {
            reads: self.reads.clone(),
            writes: self.writes.clone(),
        }
    }
}

impl<T> fmt::Debug for TQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TQueue")
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .finish()
    }
}
