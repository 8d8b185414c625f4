//! Transactional hash maps.
//!
//! A [`TMap`] stores an [`im::HashMap`] in a single TVar. The map is a
//! hash array mapped trie, so the copy a transaction writes back shares
//! almost all of its structure with the snapshot it read.

use std::fmt;
use std::hash::Hash;
use stmx::{new_tvar, StmResult, TVar};

/// A transactional key/value map.
pub struct TMap<K, V> {
    inner: TVar<im::HashMap<K, V>>,
}

impl<K, V> TMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            inner: TVar::new(im::HashMap::new()),
        }
    }

    /// Create an empty map inside a transaction.
    pub fn new_tx() -> StmResult<Self> {
        Ok(Self {
            inner: new_tvar(im::HashMap::new())?,
        })
    }

    /// Check whether `key` is present.
    pub fn member(&self, key: &K) -> StmResult<bool> {
        Ok(self.inner.read_tx()?.contains_key(key))
    }

    /// The value stored under `key`, if any.
    pub fn lookup(&self, key: &K) -> StmResult<Option<V>> {
        Ok(self.inner.read_tx()?.get(key).cloned())
    }

    /// Insert or replace the value under `key`.
    pub fn insert(&self, key: K, value: V) -> StmResult<()> {
        self.inner.modify_tx(|mut map| {
            map.insert(key, value);
            map
        })
    }

    /// Apply `f` to the value under `key`. Does nothing if `key` is absent.
    pub fn update(&self, key: &K, f: impl FnOnce(V) -> V) -> StmResult<()> {
        let mut map = self.inner.read_tx()?;
        let Some(current) = map.get(key).cloned() else {
            return Ok(());
        };
        map.insert(key.clone(), f(current));
        self.inner.write_tx(map)
    }

    /// Remove `key` and its value.
    pub fn remove(&self, key: &K) -> StmResult<()> {
        let mut map = self.inner.read_tx()?;
        if map.remove(key).is_some() {
            self.inner.write_tx(map)?;
        }
        Ok(())
    }

    /// Number of entries.
    pub fn len(&self) -> StmResult<usize> {
        Ok(self.inner.read_tx()?.len())
    }

    /// Check if the map has no entries.
    pub fn is_empty(&self) -> StmResult<bool> {
        Ok(self.inner.read_tx()?.is_empty())
    }

    /// The whole map as of this transaction.
    pub fn snapshot(&self) -> StmResult<im::HashMap<K, V>> {
        self.inner.read_tx()
    }
}

impl<K, V> Default for TMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for TMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> fmt::Debug for TMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TMap").field("inner", &self.inner).finish()
    }
}
