//! Runtime configuration and statistics.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Process-wide STM configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StmConfig {
    /// Number of conflict restarts of a single transaction after which a
    /// contention warning is logged.
    pub contention_warning: u32,
    /// Longest a transaction stays parked in retry before it re-runs anyway.
    /// `None` parks until a watched TVar is notified.
    pub park_timeout: Option<Duration>,
}

impl StmConfig {
    const DEFAULT: Self = Self {
        contention_warning: 1_000,
        park_timeout: None,
    };
}

impl Default for StmConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static CONFIG: RwLock<StmConfig> = RwLock::new(StmConfig::DEFAULT);

/// Install a new process-wide configuration.
///
/// Transactions already running keep the configuration they started with.
pub fn configure(config: StmConfig) {
    *CONFIG.write() = config;
}

/// Get the current process-wide configuration.
#[must_use]
pub fn config() -> StmConfig {
    CONFIG.read().clone()
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of process-wide STM counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StmStats {
    /// Transactions that committed.
    pub commits: u64,
    /// Attempts discarded because validation failed.
    pub conflicts: u64,
    /// Times a transaction parked in retry.
    pub blocks: u64,
    /// Times a parked transaction was woken by a notify.
    pub wakeups: u64,
    /// Transactions that ended with a user abort.
    pub aborts: u64,
    /// Transactions that ended through cancellation.
    pub cancellations: u64,
}

#[derive(Clone, Copy)]
pub(crate) enum Counter {
    Commit,
    Conflict,
    Block,
    Wakeup,
    Abort,
    Cancellation,
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);
static COUNTERS: [AtomicU64; 6] = [ZERO; 6];

pub(crate) fn bump(counter: Counter) {
    COUNTERS[counter as usize].fetch_add(1, Ordering::Relaxed);
}

/// Read the process-wide STM counters.
#[must_use]
pub fn stats() -> StmStats {
    let load = |c: Counter| COUNTERS[c as usize].load(Ordering::Relaxed);
    StmStats {
        commits: load(Counter::Commit),
        conflicts: load(Counter::Conflict),
        blocks: load(Counter::Block),
        wakeups: load(Counter::Wakeup),
        aborts: load(Counter::Abort),
        cancellations: load(Counter::Cancellation),
    }
}

/// Reset every STM counter to zero.
pub fn reset_stats() {
    for counter in &COUNTERS {
        counter.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StmConfig::default();
        assert_eq!(config.contention_warning, 1_000);
        assert_eq!(config.park_timeout, None);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let before = stats();
        bump(Counter::Commit);
        bump(Counter::Abort);
        let after = stats();
        assert!(after.commits > before.commits);
        assert!(after.aborts > before.aborts);
    }
}
