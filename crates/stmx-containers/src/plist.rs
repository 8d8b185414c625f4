//! Persistent singly linked lists.
//!
//! A [`PList`] is immutable: `cons` and `tail` return new lists that share
//! structure with the original, so storing one in a TVar and replacing it
//! on every write is cheap. Nodes are reference counted with `Arc` so a
//! list can be shared across threads.
//!
//! # Example
//!
//! ```
//! use stmx_containers::PList;
//!
//! let xs = PList::new().cons(3).cons(2).cons(1);
//! assert_eq!(xs.head(), Ok(&1));
//! assert_eq!(xs.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
//! assert_eq!(xs.len(), 3);
//! ```

use crate::error::{ContainerError, ContainerResult};
use std::fmt;
use std::iter::FromIterator;
use std::sync::Arc;

// ============================================================
// Core Type
// ============================================================

/// An immutable, structurally shared singly linked list.
pub struct PList<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
}

struct Node<T> {
    value: T,
    next: Option<Arc<Node<T>>>,
}

// ============================================================
// Construction
// ============================================================

impl<T> PList<T> {
    /// The empty list.
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// A new list with `value` in front of this one.
    ///
    /// Time: O(1)
    #[must_use]
    pub fn cons(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }
}

impl<T> Default for PList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PList<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

/// Builds a list with the iterator's first item at the head.
impl<T> FromIterator<T> for PList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(PList::new(), |list, value| list.cons(value))
    }
}

// ============================================================
// Query
// ============================================================

impl<T> PList<T> {
    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of elements.
    ///
    /// Time: O(1)
    pub fn len(&self) -> usize {
        self.len
    }

    /// The first element.
    pub fn head(&self) -> ContainerResult<&T> {
        self.head
            .as_deref()
            .map(|node| &node.value)
            .ok_or(ContainerError::EmptyStructure("head"))
    }

    /// Everything after the first element.
    pub fn tail(&self) -> ContainerResult<Self> {
        let node = self
            .head
            .as_deref()
            .ok_or(ContainerError::EmptyStructure("tail"))?;
        Ok(Self {
            head: node.next.clone(),
            len: self.len - 1,
        })
    }

    /// Iterate from head to last element.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.as_deref(),
            remaining: self.len,
        }
    }
}

impl<T: Clone> PList<T> {
    /// Split into the first element and the rest, or `None` if empty.
    pub fn uncons(&self) -> Option<(T, Self)> {
        let node = self.head.as_deref()?;
        let rest = Self {
            head: node.next.clone(),
            len: self.len - 1,
        };
        Some((node.value.clone(), rest))
    }

    /// The same elements in reverse order.
    ///
    /// Time: O(n)
    #[must_use]
    pub fn reverse(&self) -> Self {
        self.iter()
            .fold(PList::new(), |list, value| list.cons(value.clone()))
    }

    /// The elements for which `pred` holds, in their original order.
    #[must_use]
    pub fn filter(&self, mut pred: impl FnMut(&T) -> bool) -> Self {
        if self.iter().all(&mut pred) {
            return self.clone();
        }
        self.iter().filter(|value| pred(*value)).cloned().collect()
    }

    /// Copy the elements into a `Vec`, head first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

// Dropping node by node keeps long lists from overflowing the stack.
impl<T> Drop for PList<T> {
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

impl<T: PartialEq> PartialEq for PList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for PList<T> {}

impl<T: fmt::Debug> fmt::Debug for PList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ============================================================
// Iteration
// ============================================================

/// Borrowing iterator over a [`PList`].
pub struct Iter<'a, T> {
    next: Option<&'a Node<T>>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a PList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================
// Tests
// ============================================================
