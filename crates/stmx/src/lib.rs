//! stmx: software transactional memory
//!
//! STM provides composable atomic transactions over shared mutable cells.
//!
//! # Overview
//!
//! Threads read and write [`TVar`]s inside [`atomically`] blocks. A block
//! runs against a private log and either commits all of its writes at once
//! or none of them. Transactions are:
//!
//! - **Atomic**: either all modifications commit or none do
//! - **Consistent**: a committed transaction saw one instant of every TVar it touched
//! - **Isolated**: concurrent transactions never observe each other's uncommitted writes
//!
//! Commits are optimistic. Nothing is locked while the block runs; at commit
//! every touched TVar is locked in id order and checked against the value
//! first seen. A conflict silently restarts the block. No lock is ever held
//! across a blocking point.
//!
//! # Example
//!
//! ```
//! use stmx::{atomically, TVar};
//!
//! let account1 = TVar::new(100);
//! let account2 = TVar::new(200);
//!
//! // Transfer 50 atomically
//! atomically(|| {
//!     let bal1 = account1.read_tx()?;
//!     let bal2 = account2.read_tx()?;
//!     account1.write_tx(bal1 - 50)?;
//!     account2.write_tx(bal2 + 50)?;
//!     Ok(())
//! });
//!
//! assert_eq!(account1.unsafe_read(), 50);
//! assert_eq!(account2.unsafe_read(), 250);
//! ```
//!
//! # Retry and OrElse
//!
//! [`retry`] blocks the calling thread until a TVar the transaction read
//! changes; [`or_else`] runs an alternative when the first branch retries:
//!
//! ```
//! use stmx::{atomically, check, or_else, TVar};
//!
//! let balance = TVar::new(30);
//!
//! let withdrawn = atomically(|| {
//!     or_else(
//!         || {
//!             let bal = balance.read_tx()?;
//!             check(bal >= 50)?;
//!             balance.write_tx(bal - 50)?;
//!             Ok(true)
//!         },
//!         || Ok(false),
//!     )
//! });
//! assert!(!withdrawn);
//! ```
//!
//! # Modules
//!
//! - `tvar` - Transactional variables
//! - `transaction` - The runner and its combinators
//! - `cancel` - Cancellation of blocked transactions
//! - `config` - Runtime configuration and statistics
//! - `error` - Error types

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod error;
mod frame;
pub mod transaction;
pub mod tvar;
mod waiter;

pub use cancel::CancelToken;
pub use config::{config, configure, reset_stats, stats, StmConfig, StmStats};
pub use error::{BoxError, StmError, StmResult};
pub use transaction::{
    abort, atomically, atomically_with, catch_abort, check, in_transaction, optionally, or_else,
    retry, try_atomically, unwrap_or_retry,
};
pub use tvar::{new_tvar, TVar, TVarId};
