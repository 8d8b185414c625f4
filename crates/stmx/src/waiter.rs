//! Parking for transactions blocked in retry.

use crate::cancel::CancelToken;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a parked transaction woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wakeup {
    /// A watched TVar was notified.
    Notified,
    /// The park timeout elapsed without a notify.
    TimedOut,
    /// The transaction's cancel token fired.
    Cancelled,
}

/// A blocked transaction, registered on every TVar it read.
///
/// Any one notify wakes it. The flag is sticky, so a notify that lands
/// between registration and [`Waiter::park`] is not lost.
#[derive(Debug, Default)]
pub(crate) struct Waiter {
    woken: Mutex<bool>,
    cond: Condvar,
}

impl Waiter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resume the parked thread.
    pub(crate) fn wake(&self) {
        let mut woken = self.woken.lock();
        *woken = true;
        self.cond.notify_one();
    }

    /// Suspend the calling thread until woken, timed out, or cancelled.
    pub(crate) fn park(
        self: &Arc<Self>,
        cancel: Option<&CancelToken>,
        timeout: Option<Duration>,
    ) -> Wakeup {
        if let Some(token) = cancel {
            if !token.attach(self) {
                return Wakeup::Cancelled;
            }
        }

        // One deadline for the whole park; spurious wakeups must not extend it.
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let mut timed_out = false;
        {
            let mut woken = self.woken.lock();
            while !*woken {
                match deadline {
                    Some(deadline) => {
                        if self.cond.wait_until(&mut woken, deadline).timed_out() {
                            timed_out = !*woken;
                            break;
                        }
                    }
                    None => self.cond.wait(&mut woken),
                }
            }
        }

        if let Some(token) = cancel {
            token.detach(self);
            if token.is_cancelled() {
                return Wakeup::Cancelled;
            }
        }

        if timed_out {
            Wakeup::TimedOut
        } else {
            Wakeup::Notified
        }
    }
}
