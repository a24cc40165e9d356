//! Transaction context for optimistic validation
//!
//! This module implements the per-scope bookkeeping a store needs to decide,
//! at commit time, whether a transaction may commit:
//!
//! - Read-set: the committed version of every account read (first sighting)
//! - Write-set: every account written, with the version the write was based on
//! - Predicate reads: the matching ids observed by each set read
//! - Status: Active → Validating → Committed | Aborted
//!
//! The context never holds row data. Uncommitted values live with the store
//! that owns the rows; this type only remembers enough to validate.

use crate::validation::ConflictType;
use interleave_core::{AccountId, IsolationLevel, Predicate, StoreError, StoreResult, TxnId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed)
/// - `Validating` → `Aborted` (conflict detected)
/// - `Active` → `Aborted` (explicit abort or drop)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => f.write_str("active"),
            TransactionStatus::Validating => f.write_str("validating"),
            TransactionStatus::Committed => f.write_str("committed"),
            TransactionStatus::Aborted { reason } => write!(f, "aborted ({})", reason),
        }
    }
}

/// A set read recorded for phantom detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateRead {
    /// The predicate that was evaluated
    pub predicate: Predicate,
    /// Committed account ids that matched when it was evaluated
    pub matched: BTreeSet<AccountId>,
}

/// Summary of what a transaction touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingOperations {
    /// Distinct accounts read
    pub reads: usize,
    /// Distinct accounts written
    pub writes: usize,
    /// Set reads evaluated
    pub predicates: usize,
}

impl PendingOperations {
    /// Whether nothing was touched
    pub fn is_empty(&self) -> bool {
        self.reads == 0 && self.writes == 0 && self.predicates == 0
    }
}

/// Validation state of one transaction scope
///
/// Created by [`TransactionManager::begin`](crate::TransactionManager::begin)
/// with the store version current at that instant. The owning store calls the
/// `record_*` methods as the scope reads and writes, then hands the context
/// back to the manager for commit.
#[derive(Debug)]
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: TxnId,
    /// Isolation level fixed at begin
    pub isolation: IsolationLevel,
    /// Store version when the transaction started
    ///
    /// Snapshot reads see exactly the commits with version <= start_version.
    pub start_version: u64,

    /// Account → committed version first read
    read_set: HashMap<AccountId, u64>,
    /// Account → committed version the first write was based on
    write_set: HashMap<AccountId, u64>,
    /// Set reads in evaluation order
    predicate_reads: Vec<PredicateRead>,

    status: TransactionStatus,
    start_time: Instant,
}

impl TransactionContext {
    /// Create a new active transaction context
    ///
    /// # Arguments
    /// * `txn_id` - Unique transaction identifier
    /// * `isolation` - Isolation level the scope was opened at
    /// * `start_version` - Store version at transaction start
    pub fn new(txn_id: TxnId, isolation: IsolationLevel, start_version: u64) -> Self {
        TransactionContext {
            txn_id,
            isolation,
            start_version,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            predicate_reads: Vec::new(),
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    // === Recording ===

    /// Record that `account` was read at committed `version`
    ///
    /// Only the first sighting is kept: validation asks whether the row
    /// changed since the transaction first looked at it.
    pub fn record_read(&mut self, account: AccountId, version: u64) {
        self.read_set.entry(account).or_insert(version);
    }

    /// Record that `account` was written on top of committed `base_version`
    pub fn record_write(&mut self, account: AccountId, base_version: u64) {
        self.write_set.entry(account).or_insert(base_version);
    }

    /// Record a set read and the committed ids it matched
    pub fn record_predicate_read(&mut self, predicate: Predicate, matched: BTreeSet<AccountId>) {
        self.predicate_reads.push(PredicateRead { predicate, matched });
    }

    /// Version recorded for `account` in the read-set
    pub fn get_read_version(&self, account: &AccountId) -> Option<u64> {
        self.read_set.get(account).copied()
    }

    /// Base version recorded for `account` in the write-set
    pub fn get_write_base(&self, account: &AccountId) -> Option<u64> {
        self.write_set.get(account).copied()
    }

    /// Whether `account` has been written by this transaction
    pub fn has_written(&self, account: &AccountId) -> bool {
        self.write_set.contains_key(account)
    }

    /// Read-set entries
    pub fn read_set(&self) -> &HashMap<AccountId, u64> {
        &self.read_set
    }

    /// Write-set entries
    pub fn write_set(&self) -> &HashMap<AccountId, u64> {
        &self.write_set
    }

    /// Set reads in evaluation order
    pub fn predicate_reads(&self) -> &[PredicateRead] {
        &self.predicate_reads
    }

    /// Whether this transaction wrote nothing
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty()
    }

    /// Counts of what the transaction touched
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            reads: self.read_set.len(),
            writes: self.write_set.len(),
            predicates: self.predicate_reads.len(),
        }
    }

    // === State ===

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Check if transaction is in Active state
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if transaction aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Whether the transaction reached a terminal state
    pub fn is_closed(&self) -> bool {
        self.is_committed() || self.is_aborted()
    }

    /// Whether an abort is still meaningful
    pub fn can_rollback(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        )
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Ensure transaction is in Active state
    ///
    /// # Errors
    /// Returns `StoreError::ScopeClosed` if not active.
    pub fn ensure_active(&self) -> StoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(self.closed_error())
        }
    }

    fn closed_error(&self) -> StoreError {
        StoreError::ScopeClosed {
            txn_id: self.txn_id,
            state: self.status.to_string(),
        }
    }

    /// Transition to Validating state
    ///
    /// # Errors
    /// Returns `StoreError::ScopeClosed` if not in `Active` state.
    ///
    /// # State Transition
    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// Transition to Committed state
    ///
    /// # Errors
    /// Returns `StoreError::ScopeClosed` if not in `Validating` state.
    ///
    /// # State Transition
    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> StoreResult<()> {
        match self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            _ => Err(self.closed_error()),
        }
    }

    /// Abort the transaction
    ///
    /// Can be called from `Active` (explicit abort) or `Validating`
    /// (conflict detected). The write-set is cleared; the read-set is kept
    /// for diagnostics.
    ///
    /// # Errors
    /// Returns `StoreError::ScopeClosed` if already committed or aborted.
    ///
    /// # State Transition
    /// `Active` | `Validating` → `Aborted`
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> StoreResult<()> {
        if !self.can_rollback() {
            return Err(self.closed_error());
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        self.write_set.clear();
        Ok(())
    }

    /// Abort after a failed validation, describing the first conflict
    pub(crate) fn abort_with_conflicts(&mut self, conflicts: &[ConflictType]) -> StoreResult<()> {
        let reason = match conflicts.first() {
            Some(first) if conflicts.len() > 1 => {
                format!("{} (+{} more)", first, conflicts.len() - 1)
            }
            Some(first) => first.to_string(),
            None => "validation failed".to_string(),
        };
        self.mark_aborted(reason)
    }
}
