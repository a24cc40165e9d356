//! Run results
//!
//! A [`ScenarioReport`] holds one [`WorkerReport`] per worker, in the order
//! the scenario declared them, with every step the worker executed (or
//! skipped) and every assertion it evaluated. Times are offsets from the
//! start of the run in microseconds, so records from different workers can
//! be ordered against each other.

use crate::error::{HarnessError, HarnessResult, ScenarioFailure};
use crate::observation::Observation;
use crate::step::Expectation;
use chrono::{DateTime, Utc};
use interleave_concurrency::WaitStatus;
use interleave_core::IsolationLevel;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a worker
///
/// `Created → Running → {Committed, Aborted, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Not started yet
    Created,
    /// Executing steps
    Running,
    /// Scope committed
    Committed,
    /// Scope aborted, as the scenario declared
    Aborted,
    /// Undeclared abort, store error, failed wait or panic
    Failed,
}

impl WorkerState {
    /// Whether the worker reached an end state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::Committed | WorkerState::Aborted | WorkerState::Failed
        )
    }
}

/// How a worker ended, judged against its expectation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// Committed as expected
    Committed {
        /// Commit version the store assigned
        version: u64,
    },
    /// Aborted, and the scenario said it would
    AbortedExpected {
        /// Abort reason
        reason: String,
    },
    /// Aborted, but the scenario expected a commit
    AbortedUnexpected {
        /// Abort reason
        reason: String,
    },
    /// Ended as expected but at least one assertion failed
    AssertionFailed {
        /// Number of failed assertions
        mismatches: usize,
    },
    /// Store error, failed barrier wait, wrong terminal action or panic
    Failed {
        /// Failure description
        error: String,
    },
}

impl WorkerOutcome {
    /// Whether this outcome lets the scenario pass
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            WorkerOutcome::Committed { .. } | WorkerOutcome::AbortedExpected { .. }
        )
    }

    /// Short outcome name
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerOutcome::Committed { .. } => "committed",
            WorkerOutcome::AbortedExpected { .. } => "aborted_expected",
            WorkerOutcome::AbortedUnexpected { .. } => "aborted_unexpected",
            WorkerOutcome::AssertionFailed { .. } => "assertion_failed",
            WorkerOutcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerOutcome::Committed { version } => write!(f, "committed at v{}", version),
            WorkerOutcome::AbortedExpected { reason } => write!(f, "aborted as expected: {}", reason),
            WorkerOutcome::AbortedUnexpected { reason } => write!(f, "aborted unexpectedly: {}", reason),
            WorkerOutcome::AssertionFailed { mismatches } => {
                write!(f, "{} assertion(s) failed", mismatches)
            }
            WorkerOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// What a step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// Completed without producing a value
    Done,
    /// Completed and filled a slot
    Observed {
        /// Value stored in the slot
        value: Observation,
    },
    /// Barrier wait finished
    Waited {
        /// How it finished
        wait: WaitStatus,
        /// How long it took
        waited_ms: u64,
    },
    /// Assertion evaluated
    Checked {
        /// Whether it held
        passed: bool,
    },
    /// Scope committed
    Committed {
        /// Commit version
        version: u64,
    },
    /// Scope aborted
    Aborted {
        /// Reason
        reason: String,
    },
    /// Step failed
    Failed {
        /// Error text
        error: String,
    },
    /// Not executed because the worker had already stopped
    Skipped,
}

/// One executed (or skipped) step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Position in the worker's program; the implicit commit gets `len`
    pub index: usize,
    /// Rendered step
    pub step: String,
    /// Offset from run start when the step finished
    pub at_us: u64,
    /// Result
    pub status: StepStatus,
}

/// Result of one `Assert` step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionResult {
    /// Label
    pub label: String,
    /// Slot compared
    pub slot: String,
    /// Expected value
    pub expected: Observation,
    /// Slot content, `None` if never filled
    pub observed: Option<Observation>,
    /// Whether they matched
    pub passed: bool,
    /// Offset from run start
    pub at_us: u64,
}

/// A failure and when it happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedFailure {
    /// Offset from run start
    pub at_us: u64,
    /// What went wrong
    pub failure: ScenarioFailure,
}

/// Everything one worker did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Worker name
    pub worker: String,
    /// Isolation level
    pub isolation: IsolationLevel,
    /// Whether a session cache wrapped the scope
    pub session_cache: bool,
    /// Declared terminal action
    pub expectation: Expectation,
    /// Final lifecycle state
    pub state: WorkerState,
    /// Judged outcome
    pub outcome: WorkerOutcome,
    /// Step history
    pub steps: Vec<StepRecord>,
    /// Assertions in evaluation order
    pub assertions: Vec<AssertionResult>,
    /// Failures in time order
    pub failures: Vec<TimedFailure>,
}

impl WorkerReport {
    /// Whether the worker's part of the scenario passed
    pub fn passed(&self) -> bool {
        self.outcome.is_success() && self.failures.is_empty()
    }

    /// Observed value of the first assertion with this label
    pub fn observed(&self, label: &str) -> Option<&Observation> {
        self.assertions
            .iter()
            .find(|a| a.label == label)
            .and_then(|a| a.observed.as_ref())
    }

    /// `P`/`F` per assertion, in order
    pub fn assertion_pattern(&self) -> String {
        self.assertions
            .iter()
            .map(|a| if a.passed { 'P' } else { 'F' })
            .collect()
    }
}

/// Result of one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Scenario name
    pub scenario: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Run duration
    pub duration_us: u64,
    /// Per-worker reports, in declaration order
    pub workers: Vec<WorkerReport>,
    /// Whether every worker passed
    pub passed: bool,
    /// Earliest failure across all workers
    pub first_failure: Option<TimedFailure>,
}

impl ScenarioReport {
    /// Assemble a report and derive `passed` / `first_failure`
    pub fn new(
        run_id: Uuid,
        scenario: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_us: u64,
        workers: Vec<WorkerReport>,
    ) -> Self {
        let first_failure = workers
            .iter()
            .flat_map(|w| w.failures.iter())
            .min_by_key(|f| f.at_us)
            .cloned();
        let passed = first_failure.is_none() && workers.iter().all(WorkerReport::passed);
        Self {
            run_id,
            scenario: scenario.into(),
            started_at,
            duration_us,
            workers,
            passed,
            first_failure,
        }
    }

    /// Report of the named worker
    pub fn worker(&self, name: &str) -> Option<&WorkerReport> {
        self.workers.iter().find(|w| w.worker == name)
    }

    /// Terminal outcome and assertion pattern per worker
    ///
    /// Two runs of the same scenario on fresh stores must produce the same
    /// signature.
    pub fn signature(&self) -> String {
        self.workers
            .iter()
            .map(|w| format!("{}={}/{}", w.worker, w.outcome.kind(), w.assertion_pattern()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Turn a failed report into `HarnessError::ScenarioFailed`
    pub fn ensure_passed(&self) -> HarnessResult<()> {
        if self.passed {
            return Ok(());
        }
        let failure = match &self.first_failure {
            Some(timed) => timed.failure.clone(),
            // Every non-success outcome records a failure; keep a fallback
            None => ScenarioFailure::OutcomeMismatch {
                worker: self
                    .workers
                    .iter()
                    .find(|w| !w.passed())
                    .map(|w| w.worker.clone())
                    .unwrap_or_default(),
                expected: Expectation::Commit,
                actual: "worker did not pass".to_string(),
            },
        };
        Err(HarnessError::ScenarioFailed {
            scenario: self.scenario.clone(),
            failure,
        })
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scenario '{}' {} ({} workers, {}us)",
            self.scenario,
            if self.passed { "passed" } else { "FAILED" },
            self.workers.len(),
            self.duration_us
        )?;
        for worker in &self.workers {
            writeln!(
                f,
                "  {} [{}{}]: {}",
                worker.worker,
                worker.isolation,
                if worker.session_cache { ", cached" } else { "" },
                worker.outcome
            )?;
            for step in &worker.steps {
                writeln!(f, "    {:>8}us #{} {} => {:?}", step.at_us, step.index, step.step, step.status)?;
            }
        }
        if let Some(first) = &self.first_failure {
            writeln!(f, "  first failure at {}us: {}", first.at_us, first.failure)?;
        }
        Ok(())
    }
}
