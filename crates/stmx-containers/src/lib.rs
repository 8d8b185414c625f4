//! stmx Containers
//!
//! Transactional data structures built on [`stmx`] TVars. Every operation
//! is an ordinary transactional action: it returns [`stmx::StmResult`] and
//! composes with other reads, writes and `or_else` inside one `atomically`.
//!
//! # Containers
//!
//! - `tarray` - Fixed-size arrays, one TVar per element
//! - `tmap` - Hash maps stored as a persistent trie in one TVar
//! - `tset` - Hash sets, same layout as `tmap`
//! - `tqueue` - FIFO queues with separate read and write ends
//! - `tsem` - Counting semaphores
//! - `tmvar` - One-slot boxes that are either empty or full
//! - `plist` - The persistent list behind `tqueue`
//!
//! # Example
//!
//! ```
//! use stmx::atomically;
//! use stmx_containers::{TMap, TSem};
//!
//! let stock: TMap<&str, u32> = TMap::new();
//! let slots = TSem::new(1).unwrap();
//!
//! atomically(|| {
//!     slots.acquire()?;
//!     stock.insert("apples", 3)
//! });
//! assert_eq!(atomically(|| stock.lookup(&"apples")), Some(3));
//! assert_eq!(atomically(|| slots.available()), 0);
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod error;
pub mod plist;
pub mod tarray;
pub mod tmap;
pub mod tmvar;
pub mod tqueue;
pub mod tsem;
pub mod tset;

pub use error::{ContainerError, ContainerResult};
pub use plist::PList;
pub use tarray::TArray;
pub use tmap::TMap;
pub use tmvar::TMVar;
pub use tqueue::TQueue;
pub use tsem::TSem;
pub use tset::TSet;
