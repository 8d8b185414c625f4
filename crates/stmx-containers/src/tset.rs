//! Transactional hash sets backed by [`im::HashSet`].

use std::fmt;
use std::hash::Hash;
use stmx::{new_tvar, StmResult, TVar};

/// A transactional set.
pub struct TSet<T> {
    inner: TVar<im::HashSet<T>>,
}

impl<T> TSet<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            inner: TVar::new(im::HashSet::new()),
        }
    }

    /// Create an empty set inside a transaction.
    pub fn new_tx() -> StmResult<Self> {
        Ok(Self {
            inner: new_tvar(im::HashSet::new())?,
        })
    }

    /// Check whether `value` is in the set.
    pub fn member(&self, value: &T) -> StmResult<bool> {
        Ok(self.inner.read_tx()?.contains(value))
    }

    /// Add `value`. Writes only if it was absent.
    pub fn insert(&self, value: T) -> StmResult<()> {
        let mut set = self.inner.read_tx()?;
        if set.insert(value).is_none() {
            self.inner.write_tx(set)?;
        }
        Ok(())
    }

    /// Remove `value` if present.
    pub fn remove(&self, value: &T) -> StmResult<()> {
        let mut set = self.inner.read_tx()?;
        if set.remove(value).is_some() {
            self.inner.write_tx(set)?;
        }
        Ok(())
    }

    /// Number of elements.
    pub fn len(&self) -> StmResult<usize> {
        Ok(self.inner.read_tx()?.len())
    }

    /// Check if the set has no elements.
    pub fn is_empty(&self) -> StmResult<bool> {
        Ok(self.inner.read_tx()?.is_empty())
    }
}

impl<T> Default for TSet<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for TSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TSet").field("inner", &self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmx::{atomically, or_else, retry};

    #[test]
    fn test_insert_member_remove() {
        let set = TSet::new();
        atomically(|| {
            set.insert(1)?;
            set.insert(2)?;
            set.insert(2)
        });
        assert_eq!(atomically(|| set.len()), 2);
        assert!(atomically(|| set.member(&1)));

        atomically(|| set.remove(&1));
        assert!(!atomically(|| set.member(&1)));
        atomically(|| set.remove(&2));
        assert!(atomically(|| set.is_empty()));
    }

    #[test]
    fn test_duplicate_insert_is_read_only() {
        let set = TSet::new();
        atomically(|| set.insert("x"));

        // The second insert only reads, so the retried branch has no writes to drop.
        let member = atomically(|| {
            or_else(
                || {
                    set.insert("x")?;
                    retry()
                },
                || set.member(&"x"),
            )
        });
        assert!(member);
        assert_eq!(atomically(|| set.len()), 1);
    }

    #[test]
    fn test_new_tx() {
        let set = atomically(|| {
            let set = TSet::new_tx()?;
            set.insert('a')?;
            Ok(set)
        });
        assert!(atomically(|| set.member(&'a')));
    }
}
