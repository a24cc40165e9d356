//! In-memory statement log
//!
//! When `StoreConfig::query_log` is on, every operation a scope performs is
//! appended here as a SQL-flavoured line, in the order the store executed
//! it. Reading the log after a run shows the interleaving the store actually
//! saw, much like a database's general query log.

use chrono::{DateTime, Utc};
use interleave_core::{IsolationLevel, TxnId};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// One logged statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryLogEntry {
    /// Position in the log, from 0
    pub seq: u64,
    /// Wall-clock time the statement was logged
    pub at: DateTime<Utc>,
    /// Issuing transaction
    pub txn_id: TxnId,
    /// Its isolation level
    pub isolation: IsolationLevel,
    /// Statement text
    pub statement: String,
}

impl fmt::Display for QueryLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>4} txn={} [{}] {}",
            self.seq, self.txn_id, self.isolation, self.statement
        )
    }
}

/// Append-only statement log shared by all scopes of a store
#[derive(Debug, Default)]
pub struct QueryLog {
    entries: Mutex<Vec<QueryLogEntry>>,
}

impl QueryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement
    pub fn record(&self, txn_id: TxnId, isolation: IsolationLevel, statement: impl Into<String>) {
        let mut entries = self.entries.lock();
        let seq = entries.len() as u64;
        entries.push(QueryLogEntry {
            seq,
            at: Utc::now(),
            txn_id,
            isolation,
            statement: statement.into(),
        });
    }

    /// Copy of every entry so far
    pub fn entries(&self) -> Vec<QueryLogEntry> {
        self.entries.lock().clone()
    }

    /// Statements issued by one transaction, in order
    pub fn statements_of(&self, txn_id: TxnId) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.txn_id == txn_id)
            .map(|e| e.statement.clone())
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was logged
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
