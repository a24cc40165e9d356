//! Core types and traits for Interleave
//!
//! This crate defines the foundational types used throughout the system:
//! - IsolationLevel: The isolation level a transaction scope is opened at
//! - LedgerEntry: A named account with a balance, the payload under test
//! - Predicate: Balance comparison for set reads (phantom scenarios)
//! - StoreError: Error taxonomy of the store contract
//! - Traits: TransactionalStore and TransactionScope

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use traits::{TransactionScope, TransactionalStore};
pub use types::{
    AccountId, Balance, Comparison, IsolationLevel, LedgerEntry, Predicate, TxnId,
};
