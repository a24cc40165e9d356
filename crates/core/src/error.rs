//! Error types for the store contract
//!
//! Every operation on a [`TransactionScope`](crate::traits::TransactionScope)
//! returns [`StoreResult`]. We use `thiserror` for automatic `Display` and
//! `Error` trait implementations.

use crate::types::{IsolationLevel, TxnId};
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a store adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store cannot honor the requested isolation level
    #[error("Unsupported isolation level: {0}")]
    UnsupportedIsolationLevel(IsolationLevel),

    /// Commit-time write-write or serialization conflict
    ///
    /// The scope is aborted when this is returned.
    #[error("Commit conflict in transaction {txn_id}: {reason}")]
    CommitConflict {
        /// Transaction that lost
        txn_id: TxnId,
        /// Human-readable conflict description
        reason: String,
    },

    /// No account with this name is visible to the scope
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// An account with this name already exists
    #[error("Duplicate account: {0}")]
    DuplicateAccount(String),

    /// A lock could not be acquired within the store's lock wait timeout
    #[error("Lock wait timeout on '{account}' after {waited_ms}ms")]
    LockWaitTimeout {
        /// Account (or `*` for the predicate lock) being waited on
        account: String,
        /// How long the scope waited
        waited_ms: u64,
    },

    /// The scope already committed or aborted
    #[error("Transaction {txn_id} is closed: {state}")]
    ScopeClosed {
        /// Transaction that was used after close
        txn_id: TxnId,
        /// Terminal state it was in
        state: String,
    },

    /// Applying a delta would overflow the balance
    #[error("Balance overflow on '{0}'")]
    BalanceOverflow(String),
}

impl StoreError {
    /// Whether this is a commit-time conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::CommitConflict { .. })
    }

    /// Whether the store rejected the isolation level at `begin`
    pub fn is_unsupported_level(&self) -> bool {
        matches!(self, StoreError::UnsupportedIsolationLevel(_))
    }

    /// Whether the store closed the scope on its own
    ///
    /// Callers treat these exactly like an explicit abort.
    pub fn is_abort_like(&self) -> bool {
        self.is_conflict()
    }
}
