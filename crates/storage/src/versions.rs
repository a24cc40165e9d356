//! Row version chains
//!
//! Every account is a [`Row`]: a chain of committed versions, oldest first,
//! plus at most one uncommitted intent. Only the transaction holding the
//! row's exclusive lock may own the intent, so one slot is enough.
//!
//! Visibility for a reader depends on its isolation level:
//!
//! | Level            | Sees                                                   |
//! |------------------|--------------------------------------------------------|
//! | own writes       | its own intent, always                                 |
//! | ReadUncommitted  | any intent, else the latest committed version          |
//! | ReadCommitted    | the latest committed version                           |
//! | RepeatableRead   | the latest version committed at or before its snapshot |
//! | Serializable     | same as RepeatableRead                                 |
//!
//! A row created by an uncommitted transaction has no committed versions and
//! is therefore invisible to everybody except (at ReadUncommitted) dirty
//! readers and its creator.

use chrono::{DateTime, Utc};
use interleave_concurrency::CommittedState;
use interleave_core::{
    AccountId, Balance, IsolationLevel, LedgerEntry, Predicate, StoreError, StoreResult, TxnId,
};
use std::collections::{BTreeMap, BTreeSet};

/// One committed state of a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowVersion {
    /// Commit version that produced it
    pub commit_version: u64,
    /// Account name at that version
    pub name: String,
    /// Balance at that version
    pub balance: Balance,
}

/// Uncommitted state of a row owned by one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    /// Owning transaction
    pub txn_id: TxnId,
    /// Pending name
    pub name: String,
    /// Pending balance
    pub balance: Balance,
}

/// An account and its history
#[derive(Debug, Clone)]
pub struct Row {
    id: AccountId,
    created_at: DateTime<Utc>,
    versions: Vec<RowVersion>,
    intent: Option<Intent>,
}

impl Row {
    /// Latest committed version, if any
    pub fn latest(&self) -> Option<&RowVersion> {
        self.versions.last()
    }

    /// Latest version committed at or before `snapshot`
    pub fn at_snapshot(&self, snapshot: u64) -> Option<&RowVersion> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.commit_version <= snapshot)
    }

    /// Pending intent, if any
    pub fn intent(&self) -> Option<&Intent> {
        self.intent.as_ref()
    }

    /// Version of the latest commit, 0 if never committed
    pub fn committed_version(&self) -> u64 {
        self.latest().map_or(0, |v| v.commit_version)
    }

    /// Number of committed versions
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    fn entry(&self, name: &str, balance: Balance) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            name: name.to_string(),
            balance,
            created_at: self.created_at,
        }
    }
}

/// How a transaction looks at the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadView {
    /// Reading transaction
    pub txn_id: TxnId,
    /// Its isolation level
    pub isolation: IsolationLevel,
    /// Its begin-time version
    pub snapshot: u64,
}

impl ReadView {
    /// Build a view for a transaction
    pub fn new(txn_id: TxnId, isolation: IsolationLevel, snapshot: u64) -> Self {
        Self {
            txn_id,
            isolation,
            snapshot,
        }
    }

    /// What this view sees of `row`
    pub fn visible(&self, row: &Row) -> Option<LedgerEntry> {
        if let Some(intent) = row.intent() {
            if intent.txn_id == self.txn_id || self.isolation.permits_dirty_reads() {
                return Some(row.entry(&intent.name, intent.balance));
            }
        }
        self.committed(row)
            .map(|version| row.entry(&version.name, version.balance))
    }

    /// The committed version this view reads, ignoring intents
    pub fn committed<'a>(&self, row: &'a Row) -> Option<&'a RowVersion> {
        if self.isolation.reads_from_snapshot() {
            row.at_snapshot(self.snapshot)
        } else {
            row.latest()
        }
    }

    /// What a write by this view's transaction starts from
    ///
    /// Writes are current reads: the writer's own intent, else the latest
    /// committed version, regardless of snapshot.
    pub fn current(&self, row: &Row) -> Option<LedgerEntry> {
        match row.intent() {
            Some(intent) if intent.txn_id == self.txn_id => {
                Some(row.entry(&intent.name, intent.balance))
            }
            _ => row
                .latest()
                .map(|version| row.entry(&version.name, version.balance)),
        }
    }
}

/// All rows of one store, ordered by id
#[derive(Debug, Default)]
pub struct RowTable {
    rows: BTreeMap<AccountId, Row>,
    next_id: u64,
}

impl RowTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Id the next created row will get
    pub fn peek_next_id(&self) -> AccountId {
        AccountId(self.next_id.max(1))
    }

    /// Look up a row by id
    pub fn get(&self, id: AccountId) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Number of rows, including uncommitted creations
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row `view` sees under `name`
    pub fn find_by_name(&self, view: &ReadView, name: &str) -> Option<LedgerEntry> {
        self.rows
            .values()
            .filter_map(|row| view.visible(row))
            .find(|entry| entry.name == name)
    }

    /// Row a write by `view`'s transaction would target under `name`
    pub fn find_current(&self, view: &ReadView, name: &str) -> Option<LedgerEntry> {
        self.rows
            .values()
            .filter_map(|row| view.current(row))
            .find(|entry| entry.name == name)
    }

    /// Every row `view` sees, in id order
    pub fn scan(&self, view: &ReadView) -> Vec<LedgerEntry> {
        self.rows.values().filter_map(|row| view.visible(row)).collect()
    }

    /// Ids whose committed version (as `view` reads it) matches `predicate`
    ///
    /// Intents, including the reader's own, are ignored; this is what a
    /// serializable scan records for later phantom validation.
    pub fn committed_matches_in(&self, view: &ReadView, predicate: &Predicate) -> BTreeSet<AccountId> {
        self.rows
            .values()
            .filter(|row| {
                view.committed(row)
                    .is_some_and(|version| predicate.matches(version.balance))
            })
            .map(|row| row.id)
            .collect()
    }

    /// Whether `name` is taken from the point of view of `txn_id`
    ///
    /// A name is taken if any row other than `except` carries it as the
    /// writer's own intent, another transaction's intent, or the latest
    /// committed name of a row the writer has not renamed.
    pub fn name_taken(&self, txn_id: TxnId, name: &str, except: Option<AccountId>) -> bool {
        self.rows
            .values()
            .filter(|row| Some(row.id) != except)
            .any(|row| match row.intent() {
                Some(intent) if intent.txn_id == txn_id => intent.name == name,
                Some(intent) => {
                    intent.name == name || row.latest().is_some_and(|v| v.name == name)
                }
                None => row.latest().is_some_and(|v| v.name == name),
            })
    }

    /// Insert a new row owned by `txn_id` as an intent
    pub fn create(&mut self, txn_id: TxnId, name: &str) -> LedgerEntry {
        let id = self.peek_next_id();
        self.next_id = id.as_u64() + 1;
        let row = Row {
            id,
            created_at: Utc::now(),
            versions: Vec::new(),
            intent: Some(Intent {
                txn_id,
                name: name.to_string(),
                balance: 0,
            }),
        };
        let entry = row.entry(name, 0);
        self.rows.insert(id, row);
        entry
    }

    /// Replace (or create) `txn_id`'s intent on row `id`
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if the row vanished (an aborted creation).
    pub fn put_intent(&mut self, txn_id: TxnId, id: AccountId, name: String, balance: Balance) -> StoreResult<()> {
        let row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))?;
        row.intent = Some(Intent {
            txn_id,
            name,
            balance,
        });
        Ok(())
    }

    /// Turn every intent of `txn_id` into a committed version
    ///
    /// Returns the number of rows published.
    pub fn publish(&mut self, txn_id: TxnId, commit_version: u64) -> usize {
        let mut published = 0;
        for row in self.rows.values_mut() {
            if row.intent.as_ref().is_some_and(|i| i.txn_id == txn_id) {
                if let Some(intent) = row.intent.take() {
                    row.versions.push(RowVersion {
                        commit_version,
                        name: intent.name,
                        balance: intent.balance,
                    });
                    published += 1;
                }
            }
        }
        published
    }

    /// Drop every intent of `txn_id`, removing rows it created
    ///
    /// Returns the number of intents discarded.
    pub fn discard(&mut self, txn_id: TxnId) -> usize {
        let mut discarded = 0;
        for row in self.rows.values_mut() {
            if row.intent.as_ref().is_some_and(|i| i.txn_id == txn_id) {
                row.intent = None;
                discarded += 1;
            }
        }
        self.rows
            .retain(|_, row| row.intent.is_some() || !row.versions.is_empty());
        discarded
    }
}

impl CommittedState for RowTable {
    fn committed_version(&self, account: AccountId) -> u64 {
        self.rows.get(&account).map_or(0, Row::committed_version)
    }

    fn committed_matches(&self, predicate: &Predicate) -> BTreeSet<AccountId> {
        self.rows
            .values()
            .filter(|row| row.latest().is_some_and(|v| predicate.matches(v.balance)))
            .map(|row| row.id)
            .collect()
    }
}
