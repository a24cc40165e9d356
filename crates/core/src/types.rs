//! Core types for the interleaving harness
//!
//! This module defines the foundational types shared by every layer:
//! - IsolationLevel: The four ANSI isolation levels a scope can be opened at
//! - AccountId / TxnId / Balance: Identifiers and the numeric payload
//! - LedgerEntry: A named account with a balance (the row under test)
//! - Predicate: A simple balance comparison used by set reads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction identifier assigned by the store at `begin`
pub type TxnId = u64;

/// Numeric balance held by an account
pub type Balance = i64;

/// Transaction isolation level
///
/// Fixed when a scope is opened and never changed mid-scope. The store
/// decides what each level means; the harness only passes it through.
///
/// Serialized as kebab-case strings (`"read-committed"`), which is also the
/// format accepted by [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    /// Reads may observe other transactions' uncommitted writes
    ReadUncommitted,
    /// Each read observes the latest committed state at the time of the read
    ReadCommitted,
    /// Reads observe a snapshot fixed when the scope began
    RepeatableRead,
    /// Snapshot reads plus read locks and commit-time read validation
    Serializable,
}

impl IsolationLevel {
    /// All levels, weakest first
    pub const ALL: [IsolationLevel; 4] = [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    /// Stable kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read-uncommitted",
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    /// Whether reads at this level may observe uncommitted intents
    pub fn permits_dirty_reads(&self) -> bool {
        matches!(self, IsolationLevel::ReadUncommitted)
    }

    /// Whether reads at this level are served from a begin-time snapshot
    pub fn reads_from_snapshot(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }

    /// Whether reads at this level take shared locks
    pub fn takes_read_locks(&self) -> bool {
        matches!(self, IsolationLevel::Serializable)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        IsolationLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| format!("unknown isolation level '{}'", s))
    }
}

/// Store-assigned account identifier
///
/// Stable across renames; the session cache keys its identity map on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl AccountId {
    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named account with a numeric balance
///
/// Owned by the store. The harness only ever sees copies of it returned by a
/// scope; names are unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Stable identifier
    pub id: AccountId,
    /// Unique account name
    pub name: String,
    /// Current balance as visible to the reading scope
    pub balance: Balance,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a fresh account with a zero balance
    pub fn new(id: AccountId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            balance: 0,
            created_at: Utc::now(),
        }
    }
}

/// Comparison operator of a [`Predicate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `>`
    GreaterThan,
    /// `>=`
    AtLeast,
    /// `<`
    LessThan,
    /// `<=`
    AtMost,
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::GreaterThan => ">",
            Comparison::AtLeast => ">=",
            Comparison::LessThan => "<",
            Comparison::AtMost => "<=",
            Comparison::Equal => "=",
            Comparison::NotEqual => "<>",
        }
    }
}

/// A simple comparison against an account's balance
///
/// Used by `count_where` for phantom-read scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    /// Operator applied as `balance <op> operand`
    pub comparison: Comparison,
    /// Right-hand side of the comparison
    pub operand: Balance,
}

impl Predicate {
    /// Build a predicate from an operator and operand
    pub fn new(comparison: Comparison, operand: Balance) -> Self {
        Self {
            comparison,
            operand,
        }
    }

    /// `balance > operand`
    pub fn balance_gt(operand: Balance) -> Self {
        Self::new(Comparison::GreaterThan, operand)
    }

    /// `balance = operand`
    pub fn balance_eq(operand: Balance) -> Self {
        Self::new(Comparison::Equal, operand)
    }

    /// Matches every account; the predicate of a full listing
    pub fn any() -> Self {
        Self::new(Comparison::AtLeast, Balance::MIN)
    }

    /// Evaluate the predicate against a balance
    pub fn matches(&self, balance: Balance) -> bool {
        match self.comparison {
            Comparison::GreaterThan => balance > self.operand,
            Comparison::AtLeast => balance >= self.operand,
            Comparison::LessThan => balance < self.operand,
            Comparison::AtMost => balance <= self.operand,
            Comparison::Equal => balance == self.operand,
            Comparison::NotEqual => balance != self.operand,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "balance {} {}", self.comparison.symbol(), self.operand)
    }
}
