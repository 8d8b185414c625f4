//! Configuration and statistics.
//!
//! Both are process-wide, so everything runs in one test to keep the
//! counters free of interference from other tests in this binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use stmx::{
    abort, atomically, atomically_with, check, config, configure, reset_stats, stats,
    try_atomically, CancelToken, StmConfig, StmError, StmStats, TVar,
};

#[test]
fn test_config_and_stats() {
    let custom = StmConfig {
        contention_warning: 5,
        park_timeout: Some(Duration::from_millis(20)),
    };
    configure(custom.clone());
    assert_eq!(config(), custom);

    reset_stats();
    assert_eq!(stats(), StmStats::default());

    // Nothing ever writes `idle`, so only the park timeout re-runs this.
    let idle = TVar::new(0);
    let attempts = AtomicUsize::new(0);
    let ran = atomically(|| {
        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        idle.read_tx()?;
        check(n >= 3)?;
        Ok(n)
    });
    assert_eq!(ran, 3);

    let result: Result<(), _> = try_atomically(|| abort("nope"));
    assert!(matches!(result, Err(StmError::Abort(_))));

    let token = CancelToken::new();
    token.cancel();
    let cancelled = atomically_with(&token, || idle.read_tx());
    assert!(matches!(cancelled, Err(StmError::Cancelled)));

    let snapshot = stats();
    assert_eq!(snapshot.commits, 1);
    assert_eq!(snapshot.blocks, 2);
    assert_eq!(snapshot.wakeups, 0);
    assert_eq!(snapshot.aborts, 1);
    assert_eq!(snapshot.cancellations, 1);
    assert_eq!(snapshot.conflicts, 0);

    configure(StmConfig::default());
    assert_eq!(config().park_timeout, None);
}
