//! Container errors.

use stmx::StmError;
use thiserror::Error;

/// Errors raised by the transactional containers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    /// A semaphore was created with a negative permit count.
    #[error("semaphore created with negative permit count {0}")]
    NegativePermits(i64),

    /// A semaphore was asked to acquire or release a negative number of permits.
    #[error("negative permit delta {0}")]
    InvalidPermitDelta(i64),

    /// Array index outside `0..len`.
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Length of the array.
        len: usize,
    },

    /// `head` or `tail` called on an empty list.
    #[error("PList::{0} called on an empty list")]
    EmptyStructure(&'static str),
}

/// Result type for non-transactional container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

impl From<ContainerError> for StmError {
    fn from(err: ContainerError) -> Self {
        StmError::abort(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_into_abort() {
        let err: StmError = ContainerError::NegativePermits(-3).into();
        assert_eq!(
            err.abort_ref::<ContainerError>(),
            Some(&ContainerError::NegativePermits(-3))
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ContainerError::IndexOutOfBounds { index: 4, len: 2 }.to_string(),
            "index 4 out of bounds for array of length 2"
        );
        assert_eq!(
            ContainerError::EmptyStructure("head").to_string(),
            "PList::head called on an empty list"
        );
    }
}
