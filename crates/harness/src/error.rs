//! Error types for the harness
//!
//! Two layers:
//! - [`ScenarioFailure`]: why a scenario *run* did not pass. Recorded in the
//!   report; a failing scenario is still a completed run.
//! - [`HarnessError`]: why the harness could not run or judged the run a
//!   failure when asked to (`ScenarioReport::ensure_passed`).

use crate::observation::{display_observed, Observation};
use crate::step::Expectation;
use interleave_core::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for harness operations
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Why a worker, and therefore its scenario, failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioFailure {
    /// An assertion observed something other than expected
    #[error("{worker}: assertion '{label}' expected {expected}, observed {}", display_observed(.observed))]
    AssertionMismatch {
        /// Worker that asserted
        worker: String,
        /// Assertion label
        label: String,
        /// Expected value
        expected: Observation,
        /// Slot content; `None` if the slot was never filled
        observed: Option<Observation>,
    },

    /// A worker expected to commit was aborted
    #[error("{worker}: unexpected abort: {reason}")]
    UnexpectedAbort {
        /// Aborted worker
        worker: String,
        /// Abort reason (explicit or from the store)
        reason: String,
    },

    /// A store operation failed
    #[error("{worker}: store error at step {step}: {error}")]
    StoreFailure {
        /// Failing worker
        worker: String,
        /// Step index
        step: usize,
        /// Store error text
        error: String,
    },

    /// A bounded barrier wait marked `Fail` timed out
    #[error("{worker}: timed out after {waited_ms}ms waiting for barrier '{barrier}'")]
    BarrierTimeout {
        /// Waiting worker
        worker: String,
        /// Barrier name
        barrier: String,
        /// How long it waited
        waited_ms: u64,
    },

    /// The worker terminated differently than declared
    #[error("{worker}: expected {expected}, but {actual}")]
    OutcomeMismatch {
        /// Worker
        worker: String,
        /// Declared terminal action
        expected: Expectation,
        /// What happened instead
        actual: String,
    },

    /// The worker thread panicked
    #[error("{worker}: worker panicked: {message}")]
    WorkerPanicked {
        /// Worker
        worker: String,
        /// Panic payload, if it was a string
        message: String,
    },
}

impl ScenarioFailure {
    /// Worker the failure belongs to
    pub fn worker(&self) -> &str {
        match self {
            ScenarioFailure::AssertionMismatch { worker, .. }
            | ScenarioFailure::UnexpectedAbort { worker, .. }
            | ScenarioFailure::StoreFailure { worker, .. }
            | ScenarioFailure::BarrierTimeout { worker, .. }
            | ScenarioFailure::OutcomeMismatch { worker, .. }
            | ScenarioFailure::WorkerPanicked { worker, .. } => worker,
        }
    }

    /// Short machine-friendly kind
    pub fn kind(&self) -> &'static str {
        match self {
            ScenarioFailure::AssertionMismatch { .. } => "assertion_mismatch",
            ScenarioFailure::UnexpectedAbort { .. } => "unexpected_abort",
            ScenarioFailure::StoreFailure { .. } => "store_failure",
            ScenarioFailure::BarrierTimeout { .. } => "barrier_timeout",
            ScenarioFailure::OutcomeMismatch { .. } => "outcome_mismatch",
            ScenarioFailure::WorkerPanicked { .. } => "worker_panicked",
        }
    }
}

/// Errors raised by the harness itself
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The scenario definition is inconsistent
    #[error("Invalid scenario '{scenario}': {reason}")]
    InvalidScenario {
        /// Scenario name
        scenario: String,
        /// What is wrong with it
        reason: String,
    },

    /// Seeding accounts before the run failed
    #[error("Setup of scenario '{scenario}' failed: {source}")]
    Setup {
        /// Scenario name
        scenario: String,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// A worker thread could not be started
    #[error("Failed to spawn worker '{worker}': {reason}")]
    Spawn {
        /// Worker name
        worker: String,
        /// OS error text
        reason: String,
    },

    /// Configuration could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run completed and did not pass
    #[error("Scenario '{scenario}' failed: {failure}")]
    ScenarioFailed {
        /// Scenario name
        scenario: String,
        /// First failure by time
        failure: ScenarioFailure,
    },
}

impl HarnessError {
    pub(crate) fn invalid(scenario: &str, reason: impl Into<String>) -> Self {
        HarnessError::InvalidScenario {
            scenario: scenario.to_string(),
            reason: reason.into(),
        }
    }

    /// The scenario failure carried by `ScenarioFailed`
    pub fn failure(&self) -> Option<&ScenarioFailure> {
        match self {
            HarnessError::ScenarioFailed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}
