//! Core traits for the store contract
//!
//! This module defines the TransactionalStore and TransactionScope traits
//! that let the harness drive any store adapter (in-memory simulation or a
//! real networked database) without knowing how it is implemented.

use crate::error::StoreResult;
use crate::types::{Balance, IsolationLevel, LedgerEntry, Predicate, TxnId};

/// A store that can open transaction scopes
///
/// Thread safety: the harness shares one store between every worker thread
/// of a scenario, so implementations must be `Send + Sync`. All cross-worker
/// visibility is whatever the store's isolation semantics dictate; the
/// harness adds no locking around these calls.
pub trait TransactionalStore: Send + Sync {
    /// Scope type returned by [`begin`](Self::begin)
    type Scope: TransactionScope;

    /// Open a new transaction scope at the given isolation level
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnsupportedIsolationLevel` if the store cannot
    /// honor `level`.
    fn begin(&self, level: IsolationLevel) -> StoreResult<Self::Scope>;

    /// Whether [`begin`](Self::begin) would accept `level`
    fn supports(&self, level: IsolationLevel) -> bool;
}

/// One logical transaction bound to a single worker
///
/// # Lifecycle
///
/// 1. **BEGIN**: obtained from [`TransactionalStore::begin`]
/// 2. **OPERATE**: any number of reads and writes
/// 3. **CLOSE**: exactly one of [`commit`](Self::commit) or [`abort`](Self::abort)
///
/// A closed scope rejects every further operation with
/// `StoreError::ScopeClosed`.
pub trait TransactionScope: Send {
    /// Transaction id assigned by the store
    fn txn_id(&self) -> TxnId;

    /// Isolation level fixed at begin
    fn isolation_level(&self) -> IsolationLevel;

    /// Whether the scope has committed or aborted
    fn is_closed(&self) -> bool;

    /// Insert a new account with a zero balance
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateAccount` if the name is already taken.
    fn create_account(&mut self, name: &str) -> StoreResult<LedgerEntry>;

    /// Look up an account by name as visible under the scope's isolation level
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountNotFound` if no visible account has this name.
    fn find_account(&mut self, name: &str) -> StoreResult<LedgerEntry>;

    /// Balance of an account as visible under the scope's isolation level
    ///
    /// For levels guaranteeing repeatable reads, repeated calls return the
    /// same value unless the scope invalidates its local view.
    fn read_balance(&mut self, name: &str) -> StoreResult<Balance> {
        Ok(self.find_account(name)?.balance)
    }

    /// Apply a relative change to an account's balance
    ///
    /// Visible to this scope immediately, to others per isolation semantics.
    /// Returns the row as written, so callers learn which account the name
    /// resolved to.
    fn adjust_balance(&mut self, name: &str, delta: Balance) -> StoreResult<LedgerEntry>;

    /// Rename an account
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateAccount` if `to` is taken and
    /// `StoreError::AccountNotFound` if `from` is not visible.
    fn rename_account(&mut self, from: &str, to: &str) -> StoreResult<LedgerEntry>;

    /// Number of visible accounts whose balance satisfies `predicate`
    fn count_where(&mut self, predicate: &Predicate) -> StoreResult<usize>;

    /// Every visible account, ordered by id
    fn list_accounts(&mut self) -> StoreResult<Vec<LedgerEntry>>;

    /// Drop any scope-local memoization so the next read hits the store
    ///
    /// A pass-through scope has nothing to invalidate, hence the no-op default.
    fn invalidate_local_view(&mut self) {}

    /// Commit the scope's writes
    ///
    /// Returns the commit version assigned by the store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CommitConflict` if the store detects a
    /// serialization or write-write conflict; the scope is aborted.
    fn commit(&mut self) -> StoreResult<u64>;

    /// Discard the scope's writes
    ///
    /// Always succeeds; aborting a closed scope is a no-op.
    fn abort(&mut self, reason: &str);
}
