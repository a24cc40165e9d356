//! Commit-time validation
//!
//! Which checks run depends on the transaction's isolation level:
//!
//! - ReadUncommitted / ReadCommitted: no validation, last writer wins
//! - RepeatableRead: write-set only (first committer wins on a row)
//! - Serializable: write-set, read-set and predicate re-evaluation
//!
//! Read-only transactions always validate, whatever the level: they have
//! nothing to publish, so there is nothing for a later reader to observe
//! out of order.

use crate::transaction::TransactionContext;
use interleave_core::{AccountId, IsolationLevel, Predicate};
use std::collections::BTreeSet;
use std::fmt;

/// Committed state as seen by the validator
///
/// Implemented by the store that owns the rows. Called while the store holds
/// its commit critical section, so answers must reflect the latest commit.
pub trait CommittedState {
    /// Version of the latest committed write to `account`, 0 if none
    fn committed_version(&self, account: AccountId) -> u64;

    /// Ids of committed accounts whose latest balance matches `predicate`
    fn committed_matches(&self, predicate: &Predicate) -> BTreeSet<AccountId>;
}

/// Types of conflicts that can occur during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// An account read by the transaction was rewritten by a later commit
    ReadWriteConflict {
        /// Account that changed
        account: AccountId,
        /// Version recorded in the read-set
        read_version: u64,
        /// Latest committed version at validation time
        current_version: u64,
    },

    /// An account written by the transaction was committed by someone else
    /// after the transaction started
    WriteWriteConflict {
        /// Account both transactions wrote
        account: AccountId,
        /// Store version at transaction start
        start_version: u64,
        /// Latest committed version at validation time
        current_version: u64,
    },

    /// Re-evaluating a set read now yields a different set of accounts
    PhantomConflict {
        /// The set read
        predicate: Predicate,
        /// Accounts that now match but did not
        appeared: Vec<AccountId>,
        /// Accounts that matched but no longer do
        vanished: Vec<AccountId>,
    },
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                account,
                read_version,
                current_version,
            } => write!(
                f,
                "read-write conflict on {}: read v{}, now v{}",
                account, read_version, current_version
            ),
            ConflictType::WriteWriteConflict {
                account,
                start_version,
                current_version,
            } => write!(
                f,
                "write-write conflict on {}: committed v{} after start v{}",
                account, current_version, start_version
            ),
            ConflictType::PhantomConflict {
                predicate,
                appeared,
                vanished,
            } => write!(
                f,
                "phantom on '{}': {} appeared, {} vanished",
                predicate,
                appeared.len(),
                vanished.len()
            ),
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if `is_valid()` returns true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return f.write_str("valid");
        }
        for (i, conflict) in self.conflicts.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", conflict)?;
        }
        Ok(())
    }
}

/// Validate the read-set against current committed state
///
/// Any account whose latest committed version differs from the version the
/// transaction first read is a `ReadWriteConflict`.
pub fn validate_read_set<S: CommittedState + ?Sized>(
    txn: &TransactionContext,
    state: &S,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let mut accounts: Vec<_> = txn.read_set().iter().collect();
    accounts.sort();

    for (&account, &read_version) in accounts {
        let current_version = state.committed_version(account);
        if current_version != read_version {
            result.merge(ValidationResult::conflict(ConflictType::ReadWriteConflict {
                account,
                read_version,
                current_version,
            }));
        }
    }
    result
}

/// Validate the write-set against current committed state
///
/// First committer wins: if another transaction committed a write to the
/// same account after this one started, this one loses.
pub fn validate_write_set<S: CommittedState + ?Sized>(
    txn: &TransactionContext,
    state: &S,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let mut accounts: Vec<_> = txn.write_set().keys().copied().collect();
    accounts.sort();

    for account in accounts {
        let current_version = state.committed_version(account);
        if current_version > txn.start_version {
            result.merge(ValidationResult::conflict(
                ConflictType::WriteWriteConflict {
                    account,
                    start_version: txn.start_version,
                    current_version,
                },
            ));
        }
    }
    result
}

/// Re-evaluate every recorded set read against current committed state
pub fn validate_predicates<S: CommittedState + ?Sized>(
    txn: &TransactionContext,
    state: &S,
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    for read in txn.predicate_reads() {
        let now = state.committed_matches(&read.predicate);
        if now == read.matched {
            continue;
        }
        result.merge(ValidationResult::conflict(ConflictType::PhantomConflict {
            predicate: read.predicate,
            appeared: now.difference(&read.matched).copied().collect(),
            vanished: read.matched.difference(&now).copied().collect(),
        }));
    }
    result
}

/// Validate a transaction for commit at its isolation level
pub fn validate_transaction<S: CommittedState + ?Sized>(
    txn: &TransactionContext,
    state: &S,
) -> ValidationResult {
    if txn.is_read_only() {
        return ValidationResult::ok();
    }

    match txn.isolation {
        IsolationLevel::ReadUncommitted | IsolationLevel::ReadCommitted => ValidationResult::ok(),
        IsolationLevel::RepeatableRead => validate_write_set(txn, state),
        IsolationLevel::Serializable => {
            let mut result = validate_write_set(txn, state);
            result.merge(validate_read_set(txn, state));
            result.merge(validate_predicates(txn, state));
            result
        }
    }
}
