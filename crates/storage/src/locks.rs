//! Row and predicate lock table
//!
//! Three lock kinds:
//! - Shared row lock: taken by serializable point reads
//! - Exclusive row lock: taken by every write, at every level
//! - Predicate lock: a table-level shared lock taken by serializable scans
//!
//! Inserting a row asks for `Insert`, which is never held: it only checks
//! that nobody else holds a predicate lock, so a scanned range cannot grow
//! under a serializable reader.
//!
//! Compatibility (held by another transaction → request):
//!
//! | held \ request | Shared | Exclusive | Predicate |
//! |----------------|--------|-----------|-----------|
//! | Shared         | ok     | blocks    | ok        |
//! | Exclusive      | blocks | blocks    | blocks    |
//! | Predicate      | ok     | blocks    | ok        |
//!
//! A transaction never conflicts with itself, so a reader may upgrade to
//! exclusive as long as nobody else shares the row.
//!
//! The table itself never blocks. `try_acquire` reports the holder that
//! stands in the way and the store decides how long to wait.

use interleave_core::{AccountId, TxnId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A lock a transaction asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockRequest {
    /// Shared lock on one row
    Shared(AccountId),
    /// Exclusive lock on one row
    Exclusive(AccountId),
    /// Shared lock on the whole table
    Predicate,
    /// Permission to insert a new row; granted without being held
    Insert,
}

impl fmt::Display for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockRequest::Shared(id) => write!(f, "S({})", id),
            LockRequest::Exclusive(id) => write!(f, "X({})", id),
            LockRequest::Predicate => f.write_str("P(*)"),
            LockRequest::Insert => f.write_str("I(*)"),
        }
    }
}

#[derive(Debug, Default)]
struct RowLock {
    exclusive: Option<TxnId>,
    shared: BTreeSet<TxnId>,
}

impl RowLock {
    fn is_free(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }
}

/// Lock bookkeeping for one store
#[derive(Debug, Default)]
pub struct LockTable {
    rows: HashMap<AccountId, RowLock>,
    predicate: BTreeSet<TxnId>,
}

impl LockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// First transaction other than `txn` whose lock blocks `request`
    pub fn blocker(&self, txn: TxnId, request: LockRequest) -> Option<TxnId> {
        let other = |holder: &TxnId| *holder != txn;
        match request {
            LockRequest::Shared(id) => self
                .rows
                .get(&id)
                .and_then(|row| row.exclusive)
                .filter(other),
            LockRequest::Exclusive(id) => {
                if let Some(row) = self.rows.get(&id) {
                    if let Some(holder) = row.exclusive.filter(other) {
                        return Some(holder);
                    }
                    if let Some(&holder) = row.shared.iter().find(|&&h| h != txn) {
                        return Some(holder);
                    }
                }
                self.predicate.iter().find(|&&h| h != txn).copied()
            }
            LockRequest::Predicate => self
                .rows
                .values()
                .filter_map(|row| row.exclusive)
                .find(other),
            LockRequest::Insert => self.predicate.iter().find(|&&h| h != txn).copied(),
        }
    }

    /// Grant `request` to `txn` unless another transaction blocks it
    ///
    /// Returns the blocking transaction on failure. Re-acquiring a lock
    /// already held is a no-op.
    pub fn try_acquire(&mut self, txn: TxnId, request: LockRequest) -> Result<(), TxnId> {
        if let Some(holder) = self.blocker(txn, request) {
            return Err(holder);
        }
        match request {
            LockRequest::Shared(id) => {
                self.rows.entry(id).or_default().shared.insert(txn);
            }
            LockRequest::Exclusive(id) => {
                self.rows.entry(id).or_default().exclusive = Some(txn);
            }
            LockRequest::Predicate => {
                self.predicate.insert(txn);
            }
            LockRequest::Insert => {}
        }
        Ok(())
    }

    /// Release a single lock `txn` holds
    ///
    /// Returns whether it was held. `Insert` is never held.
    pub fn release(&mut self, txn: TxnId, request: LockRequest) -> bool {
        let released = match request {
            LockRequest::Shared(id) => self
                .rows
                .get_mut(&id)
                .is_some_and(|row| row.shared.remove(&txn)),
            LockRequest::Exclusive(id) => match self.rows.get_mut(&id) {
                Some(row) if row.exclusive == Some(txn) => {
                    row.exclusive = None;
                    true
                }
                _ => false,
            },
            LockRequest::Predicate => self.predicate.remove(&txn),
            LockRequest::Insert => false,
        };
        if let LockRequest::Shared(id) | LockRequest::Exclusive(id) = request {
            if self.rows.get(&id).is_some_and(RowLock::is_free) {
                self.rows.remove(&id);
            }
        }
        released
    }

    /// Release every lock held by `txn`
    ///
    /// Returns whether anything was released.
    pub fn release_all(&mut self, txn: TxnId) -> bool {
        let mut released = self.predicate.remove(&txn);
        for row in self.rows.values_mut() {
            if row.exclusive == Some(txn) {
                row.exclusive = None;
                released = true;
            }
            released |= row.shared.remove(&txn);
        }
        self.rows.retain(|_, row| !row.is_free());
        released
    }

    /// Whether `txn` holds an exclusive lock on `id`
    pub fn holds_exclusive(&self, txn: TxnId, id: AccountId) -> bool {
        self.rows.get(&id).and_then(|row| row.exclusive) == Some(txn)
    }

    /// Number of locks `txn` holds
    pub fn held_by(&self, txn: TxnId) -> usize {
        let rows: usize = self
            .rows
            .values()
            .map(|row| {
                usize::from(row.exclusive == Some(txn)) + usize::from(row.shared.contains(&txn))
            })
            .sum();
        rows + usize::from(self.predicate.contains(&txn))
    }

    /// Whether no locks are held at all
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.predicate.is_empty()
    }
}
