//! The transaction log.
//!
//! One [`Frame`] records every TVar an attempt touched: the snapshot taken
//! on first access (what commit validates against) and the pending value
//! later reads must see. Nested alternatives (`or_else`, `catch_abort`) run
//! in child frames stacked on the attempt's root frame, so a branch's writes
//! can be dropped while its reads survive.
//!
//! Entries are typed (`Entry<T>`) and stored behind the object-safe
//! [`LogEntry`] trait, so commit and blocking can walk a heterogeneous log
//! without knowing any value types.

use crate::tvar::{TVarId, TVarInner};
use crate::waiter::Waiter;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of one transaction attempt; doubles as the TVar lock token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FrameId(u64);

impl FrameId {
    /// Allocate a fresh id. Zero is reserved for "unlocked".
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) const fn raw(&self) -> u64 {
        self.0
    }
}

/// Type-erased view of one log entry.
pub(crate) trait LogEntry {
    /// Lock the TVar, conditioned on it still holding the snapshot.
    fn lock_cond(&self, frame: FrameId) -> bool;
    /// Release the lock, publishing the pending value.
    fn publish(&self, frame: FrameId);
    /// Release the lock, restoring the snapshot.
    fn unlock(&self, frame: FrameId);
    fn notify(&self);
    /// Register as a waiter, conditioned on the snapshot.
    fn register_waiting(&self, waiter: &Arc<Waiter>) -> bool;
    fn remove_waiting(&self, waiter: &Arc<Waiter>);
    /// Whether the pending value differs from the snapshot.
    fn is_written(&self) -> bool;
    /// A copy with the pending value reset to the snapshot.
    fn reads_only(&self) -> Box<dyn LogEntry>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Snapshot and pending value of one TVar.
pub(crate) struct Entry<T> {
    tvar: Arc<TVarInner<T>>,
    initial: Arc<T>,
    pending: Arc<T>,
}

impl<T> Entry<T> {
    pub(crate) fn new(tvar: &Arc<TVarInner<T>>, initial: Arc<T>, pending: Arc<T>) -> Self {
        Self {
            tvar: Arc::clone(tvar),
            initial,
            pending,
        }
    }

    pub(crate) fn pending(&self) -> &Arc<T> {
        &self.pending
    }

    pub(crate) fn set_pending(&mut self, value: Arc<T>) {
        self.pending = value;
    }

    /// A copy of this entry with a different pending value.
    pub(crate) fn with_pending(&self, value: Arc<T>) -> Self {
        Self::new(&self.tvar, Arc::clone(&self.initial), value)
    }
}

impl<T: Send + Sync + 'static> LogEntry for Entry<T> {
    fn lock_cond(&self, frame: FrameId) -> bool {
        self.tvar.lock_cond(frame, &self.initial)
    }

    fn publish(&self, frame: FrameId) {
        self.tvar.release(frame, Arc::clone(&self.pending));
    }

    fn unlock(&self, frame: FrameId) {
        self.tvar.release(frame, Arc::clone(&self.initial));
    }

    fn notify(&self) {
        self.tvar.notify();
    }

    fn register_waiting(&self, waiter: &Arc<Waiter>) -> bool {
        self.tvar.register_waiting(waiter, &self.initial)
    }

    fn remove_waiting(&self, waiter: &Arc<Waiter>) {
        self.tvar.remove_waiting(waiter);
    }

    fn is_written(&self) -> bool {
        !Arc::ptr_eq(&self.initial, &self.pending)
    }

    fn reads_only(&self) -> Box<dyn LogEntry> {
        Box::new(self.with_pending(Arc::clone(&self.initial)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One level of the transaction log.
#[derive(Default)]
pub(crate) struct Frame {
    entries: FxHashMap<TVarId, Box<dyn LogEntry>>,
}

impl Frame {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, id: TVarId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn get<T: Send + Sync + 'static>(&self, id: TVarId) -> Option<&Entry<T>> {
        self.entries.get(&id).map(|entry| downcast(id, entry.as_any()))
    }

    pub(crate) fn get_mut<T: Send + Sync + 'static>(&mut self, id: TVarId) -> Option<&mut Entry<T>> {
        self.entries
            .get_mut(&id)
            .map(|entry| downcast_mut(id, entry.as_any_mut()))
    }

    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, id: TVarId, entry: Entry<T>) {
        self.entries.insert(id, Box::new(entry));
    }

    pub(crate) fn insert_erased(&mut self, id: TVarId, entry: Box<dyn LogEntry>) {
        self.entries.insert(id, entry);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries with a pending write.
    pub(crate) fn write_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_written()).count()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &dyn LogEntry> {
        self.entries.values().map(|entry| &**entry)
    }

    /// Entries in TVar id order, the canonical lock acquisition order.
    pub(crate) fn into_sorted(self) -> Vec<Box<dyn LogEntry>> {
        let mut entries: Vec<_> = self.entries.into_iter().collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = (TVarId, Box<dyn LogEntry>)> {
        self.entries.into_iter()
    }
}

fn downcast<T: 'static>(id: TVarId, entry: &dyn Any) -> &Entry<T> {
    match entry.downcast_ref::<Entry<T>>() {
        Some(entry) => entry,
        None => unreachable!("{id} logged with a different value type"),
    }
}

fn downcast_mut<T: 'static>(id: TVarId, entry: &mut dyn Any) -> &mut Entry<T> {
    match entry.downcast_mut::<Entry<T>>() {
        Some(entry) => entry,
        None => unreachable!("{id} logged with a different value type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvar::TVar;

    fn entry_for(var: &TVar<i32>) -> Entry<i32> {
        let inner = var.inner();
        let snapshot = inner.unsafe_read();
        Entry::new(inner, Arc::clone(&snapshot), snapshot)
    }

    #[test]
    fn test_frame_get_and_update() {
        let var = TVar::new(10);
        let mut frame = Frame::new();
        frame.insert(var.id(), entry_for(&var));

        assert!(frame.contains(var.id()));
        assert_eq!(**frame.get::<i32>(var.id()).unwrap().pending(), 10);
        assert_eq!(frame.write_count(), 0);

        frame.get_mut::<i32>(var.id()).unwrap().set_pending(Arc::new(11));
        assert_eq!(**frame.get::<i32>(var.id()).unwrap().pending(), 11);
        assert_eq!(frame.write_count(), 1);
    }

    #[test]
    fn test_reads_only_drops_write() {
        let var = TVar::new(1);
        let mut entry = entry_for(&var);
        entry.set_pending(Arc::new(2));
        assert!(entry.is_written());
        assert!(!entry.reads_only().is_written());
    }

    #[test]
    fn test_sorted_by_id() {
        let vars: Vec<_> = (0..8).map(TVar::new).collect();
        let mut frame = Frame::new();
        for var in vars.iter().rev() {
            frame.insert(var.id(), entry_for(var));
        }
        assert_eq!(frame.len(), 8);

        let sorted = frame.into_sorted();
        let ids: Vec<i32> = sorted
            .iter()
            .map(|e| **e.as_any().downcast_ref::<Entry<i32>>().unwrap().pending())
            .collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_commit_protocol_round() {
        let var = TVar::new(5);
        let mut entry = entry_for(&var);
        entry.set_pending(Arc::new(6));
        let frame_id = FrameId::next();

        assert!(entry.lock_cond(frame_id));
        entry.publish(frame_id);
        assert_eq!(var.unsafe_read(), 6);

        // The snapshot is now stale.
        assert!(!entry.lock_cond(FrameId::next()));
    }
}
