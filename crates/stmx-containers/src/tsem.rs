//! Transactional semaphores.

use crate::error::{ContainerError, ContainerResult};
use std::fmt;
use stmx::{check, new_tvar, optionally, StmResult, TVar};

/// A counting semaphore whose permits live in a TVar.
///
/// `acquire` retries while too few permits are available, so a blocked
/// acquirer wakes as soon as a `release` commits.
pub struct TSem {
    permits: TVar<i64>,
}

impl TSem {
    /// Create a semaphore with `permits` available.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NegativePermits`] if `permits < 0`.
    pub fn new(permits: i64) -> ContainerResult<Self> {
        validate_initial(permits)?;
        Ok(Self {
            permits: TVar::new(permits),
        })
    }

    /// Create a semaphore inside a transaction. Aborts on negative `permits`.
    pub fn new_tx(permits: i64) -> StmResult<Self> {
        validate_initial(permits)?;
        Ok(Self {
            permits: new_tvar(permits)?,
        })
    }

    /// Permits currently available.
    pub fn available(&self) -> StmResult<i64> {
        self.permits.read_tx()
    }

    /// Take one permit, retrying until one is available.
    pub fn acquire(&self) -> StmResult<()> {
        self.acquire_n(1)
    }

    /// Take `n` permits at once, retrying until `n` are available.
    pub fn acquire_n(&self, n: i64) -> StmResult<()> {
        validate_delta(n)?;
        let available = self.permits.read_tx()?;
        check(available >= n)?;
        self.permits.write_tx(available - n)
    }

    /// Take one permit if available. Returns whether it was taken.
    pub fn try_acquire(&self) -> StmResult<bool> {
        self.try_acquire_n(1)
    }

    /// Take `n` permits if available. Returns whether they were taken.
    pub fn try_acquire_n(&self, n: i64) -> StmResult<bool> {
        Ok(optionally(|| self.acquire_n(n))?.is_some())
    }

    /// Return one permit.
    pub fn release(&self) -> StmResult<()> {
        self.release_n(1)
    }

    /// Return `n` permits.
    pub fn release_n(&self, n: i64) -> StmResult<()> {
        validate_delta(n)?;
        if n == 0 {
            return Ok(());
        }
        self.permits.modify_tx(|permits| permits + n)
    }
}

fn validate_initial(permits: i64) -> ContainerResult<()> {
    if permits < 0 {
        return Err(ContainerError::NegativePermits(permits));
    }
    Ok(())
}

fn validate_delta(n: i64) -> ContainerResult<()> {
    if n < 0 {
        return Err(ContainerError::InvalidPermitDelta(n));
    }
    Ok(())
}

impl Clone for TSem {
    fn clone(&self) -> Self {
        Self {
            permits: self.permits.clone(),
        }
    }
}

impl fmt::Debug for TSem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TSem")
            .field("permits", &self.permits)
            .finish()
    }
}
