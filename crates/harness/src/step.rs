//! Worker steps
//!
//! A worker's program is a flat list of [`Step`]s executed in order. Store
//! operations that return something write it into a named *slot*; `Assert`
//! steps compare a slot against an expected [`Observation`].

use crate::observation::Observation;
use interleave_core::{Balance, Predicate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a worker is expected to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// The worker must commit
    #[default]
    Commit,
    /// The worker is expected to abort (explicitly or by commit conflict)
    Abort,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Commit => f.write_str("commit"),
            Expectation::Abort => f.write_str("abort"),
        }
    }
}

/// Upper bound on a barrier wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitBound {
    /// Wait until the barrier opens
    Unbounded,
    /// Use `HarnessConfig::bounded_wait_ms`
    Configured,
    /// Wait at most this long
    Fixed(Duration),
}

impl WaitBound {
    /// Resolve against the configured default
    pub fn resolve(&self, configured: Duration) -> Option<Duration> {
        match self {
            WaitBound::Unbounded => None,
            WaitBound::Configured => Some(configured),
            WaitBound::Fixed(bound) => Some(*bound),
        }
    }
}

/// What to do when a bounded wait times out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    /// Carry on with the next step
    Proceed,
    /// Record a `BarrierTimeout` failure and stop the worker
    Fail,
}

/// One instruction of a worker program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Insert an account
    Create {
        /// Account name
        account: String,
    },
    /// Read a balance into `slot`
    Read {
        /// Account name
        account: String,
        /// Slot to store the balance in
        slot: String,
    },
    /// Apply a relative balance change
    Adjust {
        /// Account name
        account: String,
        /// Change
        delta: Balance,
    },
    /// Rename an account
    Rename {
        /// Current name
        from: String,
        /// New name
        to: String,
    },
    /// Count accounts matching a predicate into `slot`
    Count {
        /// Predicate
        predicate: Predicate,
        /// Slot to store the count in
        slot: String,
    },
    /// List account names into `slot`
    List {
        /// Slot to store the names in
        slot: String,
    },
    /// Drop the scope's local view
    InvalidateLocalView,
    /// Signal a barrier
    Signal {
        /// Barrier name
        barrier: String,
    },
    /// Wait on a barrier
    Await {
        /// Barrier name
        barrier: String,
        /// Wait bound
        bound: WaitBound,
        /// Behaviour on timeout
        on_timeout: OnTimeout,
    },
    /// Compare a slot with an expected value
    Assert {
        /// Label shown in reports
        label: String,
        /// Slot to check
        slot: String,
        /// Expected value
        expected: Observation,
    },
    /// Commit the scope
    Commit,
    /// Abort the scope
    Abort {
        /// Recorded reason
        reason: String,
    },
}

impl Step {
    /// Whether the step ends the transaction
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Commit | Step::Abort { .. })
    }

    /// Barrier the step refers to, if any
    pub fn barrier(&self) -> Option<&str> {
        match self {
            Step::Signal { barrier } | Step::Await { barrier, .. } => Some(barrier),
            _ => None,
        }
    }

    /// Short operation name
    pub fn op(&self) -> &'static str {
        match self {
            Step::Create { .. } => "create",
            Step::Read { .. } => "read",
            Step::Adjust { .. } => "adjust",
            Step::Rename { .. } => "rename",
            Step::Count { .. } => "count",
            Step::List { .. } => "list",
            Step::InvalidateLocalView => "invalidate",
            Step::Signal { .. } => "signal",
            Step::Await { .. } => "await",
            Step::Assert { .. } => "assert",
            Step::Commit => "commit",
            Step::Abort { .. } => "abort",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Create { account } => write!(f, "create {}", account),
            Step::Read { account, slot } => write!(f, "read {} -> {}", account, slot),
            Step::Adjust { account, delta } => write!(f, "adjust {} by {:+}", account, delta),
            Step::Rename { from, to } => write!(f, "rename {} -> {}", from, to),
            Step::Count { predicate, slot } => write!(f, "count where {} -> {}", predicate, slot),
            Step::List { slot } => write!(f, "list -> {}", slot),
            Step::InvalidateLocalView => f.write_str("invalidate local view"),
            Step::Signal { barrier } => write!(f, "signal {}", barrier),
            Step::Await { barrier, bound, .. } => match bound {
                WaitBound::Unbounded => write!(f, "await {}", barrier),
                WaitBound::Configured => write!(f, "await {} (bounded)", barrier),
                WaitBound::Fixed(d) => write!(f, "await {} (<= {}ms)", barrier, d.as_millis()),
            },
            Step::Assert {
                label,
                slot,
                expected,
            } => write!(f, "assert {}: {} == {}", label, slot, expected),
            Step::Commit => f.write_str("commit"),
            Step::Abort { reason } => write!(f, "abort ({})", reason),
        }
    }
}
