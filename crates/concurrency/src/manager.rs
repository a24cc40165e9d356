//! Transaction manager for coordinating commits
//!
//! Hands out transaction ids and commit versions, and runs the commit
//! protocol against a [`CommittedState`]:
//!
//! ```text
//! 1. mark_validating()      - Active → Validating
//! 2. validate_transaction() - level-dependent conflict checks
//! 3. IF conflicts: mark_aborted() and return ValidationFailed
//! 4. allocate_version()     - skipped for read-only transactions
//! 5. mark_committed()       - Validating → Committed
//! 6. Return Ok(commit_version); the caller publishes its writes at it
//! ```
//!
//! The caller must hold its commit critical section across `commit()` and
//! the publication of the writes, so no other commit can slip between
//! validation and publication.

use crate::transaction::TransactionContext;
use crate::validation::{validate_transaction, CommittedState, ValidationResult};
use interleave_core::{IsolationLevel, StoreError, TxnId};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Why a commit did not go through
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// Validation found conflicts; the transaction is now aborted
    #[error("Transaction {txn_id} failed validation: {result}")]
    ValidationFailed {
        /// Transaction that lost
        txn_id: TxnId,
        /// Conflicts found
        result: ValidationResult,
    },

    /// Transaction was not Active when commit was requested
    #[error("Transaction {txn_id} cannot commit from state {state}")]
    InvalidState {
        /// Transaction id
        txn_id: TxnId,
        /// State it was in
        state: String,
    },
}

impl From<CommitError> for StoreError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed { txn_id, result } => StoreError::CommitConflict {
                txn_id,
                reason: result.to_string(),
            },
            CommitError::InvalidState { txn_id, state } => StoreError::ScopeClosed { txn_id, state },
        }
    }
}

/// Allocates ids and versions and runs commit validation
///
/// Version 0 is the empty store. Each committed writing transaction
/// increments the version by exactly one; every row it wrote is stamped
/// with that version.
#[derive(Debug)]
pub struct TransactionManager {
    /// Global version counter
    version: AtomicU64,
    /// Next transaction ID
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Create a new transaction manager
    ///
    /// # Arguments
    /// * `initial_version` - Starting version
    pub fn new(initial_version: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(1),
        }
    }

    /// Get current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> TxnId {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate next commit version (increment global version)
    pub fn allocate_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Start a transaction at the current version
    pub fn begin(&self, isolation: IsolationLevel) -> TransactionContext {
        let txn = TransactionContext::new(self.next_txn_id(), isolation, self.current_version());
        tracing::trace!(
            txn_id = txn.txn_id,
            isolation = %isolation,
            start_version = txn.start_version,
            "transaction started"
        );
        txn
    }

    /// Validate and commit a transaction
    ///
    /// # Arguments
    /// * `txn` - Transaction to commit (must be in Active state)
    /// * `state` - Committed state to validate against
    ///
    /// # Returns
    /// - Ok(commit_version) on success; read-only transactions get the
    ///   current version without bumping it
    /// - Err(CommitError) if validation fails or the state is wrong
    pub fn commit<S: CommittedState + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        state: &S,
    ) -> Result<u64, CommitError> {
        txn.mark_validating()
            .map_err(|_| CommitError::InvalidState {
                txn_id: txn.txn_id,
                state: txn.status().to_string(),
            })?;

        let result = validate_transaction(txn, state);
        if !result.is_valid() {
            // Validating → Aborted cannot fail
            let _ = txn.abort_with_conflicts(&result.conflicts);
            tracing::debug!(
                txn_id = txn.txn_id,
                isolation = %txn.isolation,
                conflicts = result.conflict_count(),
                "commit rejected: {}",
                result
            );
            return Err(CommitError::ValidationFailed {
                txn_id: txn.txn_id,
                result,
            });
        }

        let commit_version = if txn.is_read_only() {
            self.current_version()
        } else {
            self.allocate_version()
        };

        txn.mark_committed().map_err(|_| CommitError::InvalidState {
            txn_id: txn.txn_id,
            state: txn.status().to_string(),
        })?;

        tracing::debug!(
            txn_id = txn.txn_id,
            commit_version,
            writes = txn.pending_operations().writes,
            elapsed_us = txn.elapsed().as_micros() as u64,
            "transaction committed"
        );
        Ok(commit_version)
    }

    /// Explicitly abort a transaction
    ///
    /// Aborting an already closed transaction is a no-op.
    pub fn abort(&self, txn: &mut TransactionContext, reason: &str) {
        if txn.can_rollback() && txn.mark_aborted(reason).is_ok() {
            tracing::debug!(txn_id = txn.txn_id, reason, "transaction aborted");
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(0)
    }
}
