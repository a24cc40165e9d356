//! Values a worker observes and asserts on

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a store operation returned, as recorded in a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Observation {
    /// A single balance
    Balance(i64),
    /// Result of a set read
    Count(usize),
    /// Account names, in id order
    Names(Vec<String>),
}

impl Observation {
    /// `Names` from anything yielding string-likes
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Observation::Names(names.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Balance(balance) => write!(f, "balance {}", balance),
            Observation::Count(count) => write!(f, "count {}", count),
            Observation::Names(names) => write!(f, "[{}]", names.join(", ")),
        }
    }
}

/// Render an optional observation; an empty slot prints as `none`
pub(crate) fn display_observed(observed: &Option<Observation>) -> String {
    match observed {
        Some(observation) => observation.to_string(),
        None => "none".to_string(),
    }
}
