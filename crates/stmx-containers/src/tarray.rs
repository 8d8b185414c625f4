//! Transactional arrays.
//!
//! Every element lives in its own TVar, so two transactions touching
//! different indices never conflict.

use crate::error::ContainerError;
use std::fmt;
use std::sync::Arc;
use stmx::{new_tvar, StmResult, TVar};

/// A fixed-size array of independent transactional cells.
pub struct TArray<T> {
    cells: Arc<[TVar<T>]>,
}

impl<T: Clone + Send + Sync + 'static> TArray<T> {
    /// Create an array of `len` copies of `init`.
    pub fn new(len: usize, init: T) -> Self {
        (0..len).map(|_| TVar::new(init.clone())).collect()
    }

    /// Create an array holding the given values.
    pub fn from_vec(values: Vec<T>) -> Self {
        values.into_iter().map(TVar::new).collect()
    }

    /// Create an array inside a transaction.
    pub fn new_tx(len: usize, init: T) -> StmResult<Self> {
        let cells = (0..len)
            .map(|_| new_tvar(init.clone()))
            .collect::<StmResult<Vec<_>>>()?;
        Ok(Self {
            cells: cells.into(),
        })
    }

    /// Read the element at `index`.
    ///
    /// Aborts with [`ContainerError::IndexOutOfBounds`] if `index >= len`.
    pub fn get(&self, index: usize) -> StmResult<T> {
        self.cell(index)?.read_tx()
    }

    /// Replace the element at `index`.
    pub fn set(&self, index: usize, value: T) -> StmResult<()> {
        self.cell(index)?.write_tx(value)
    }

    /// Apply `f` to every element in place.
    pub fn transform(&self, mut f: impl FnMut(T) -> T) -> StmResult<()> {
        for cell in self.cells.iter() {
            cell.modify_tx(&mut f)?;
        }
        Ok(())
    }

    /// Fold over the elements from first to last.
    pub fn fold<B>(&self, init: B, mut f: impl FnMut(B, T) -> B) -> StmResult<B> {
        let mut acc = init;
        for cell in self.cells.iter() {
            acc = f(acc, cell.read_tx()?);
        }
        Ok(acc)
    }

    fn cell(&self, index: usize) -> Result<&TVar<T>, ContainerError> {
        self.cells.get(index).ok_or(ContainerError::IndexOutOfBounds {
            index,
            len: self.cells.len(),
        })
    }
}

impl<T> TArray<T> {
    /// Number of elements. Fixed at construction.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<T> FromIterator<TVar<T>> for TArray<T> {
    fn from_iter<I: IntoIterator<Item = TVar<T>>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

impl<T> Clone for TArray<T> {
    fn clone(&self) -> Self {
        Self {
            cells: Arc::clone(&self.cells),
        }
    }
}

impl<T> fmt::Debug for TArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TArray")
            .field("len", &self.cells.len())
            .finish()
    }
}
