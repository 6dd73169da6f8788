//! Optimistic concurrency control for the shelf object store
//!
//! Transactions buffer record updates and remember the version of every
//! record they touch. The [`TransactionManager`] validates those versions
//! under a commit lock and applies all staged updates atomically, so
//! concurrent writers over the same records resolve to exactly one winner.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;

pub use manager::TransactionManager;
pub use transaction::{version_of, Transaction, TransactionStatus, MISSING_VERSION};
