//! Concurrency layer for Interleave
//!
//! This crate holds the synchronization and validation pieces shared by the
//! store and the harness:
//! - Barrier: one-shot counting gate workers signal and await
//! - TransactionContext: read/write/predicate tracking and status machine
//! - Validation: level-dependent conflict detection at commit time
//! - TransactionManager: id and version allocation, commit protocol

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod manager;
pub mod transaction;
pub mod validation;

pub use barrier::{Barrier, WaitStatus};
pub use manager::{CommitError, TransactionManager};
pub use transaction::{PendingOperations, PredicateRead, TransactionContext, TransactionStatus};
pub use validation::{
    validate_predicates, validate_read_set, validate_transaction, validate_write_set,
    CommittedState, ConflictType, ValidationResult,
};
