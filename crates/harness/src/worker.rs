//! Workers: one transaction's program and its execution
//!
//! A [`WorkerSpec`] is the declarative program. [`execute`] runs it against a
//! scope on the current thread, and produces a [`WorkerReport`].
//!
//! ## Execution rules
//!
//! - Steps run in order; only barrier waits and store calls block
//! - Assertions record a result and never stop the worker
//! - A store error fails the worker: remaining steps are skipped and the
//!   scope is aborted so its locks are released
//! - A commit conflict is handled exactly like an explicit abort
//! - An abort the scenario did not declare leaves the worker `Failed`
//! - A program without a terminal step commits after its last step
//! - `Signal` steps run even after the worker stopped, so a step list can
//!   announce its commit (`commit` then `signal`) and a failed worker still
//!   releases the barriers it owes

use crate::error::ScenarioFailure;
use crate::observation::Observation;
use crate::report::{
    AssertionResult, StepRecord, StepStatus, TimedFailure, WorkerOutcome, WorkerReport,
    WorkerState,
};
use crate::step::{Expectation, OnTimeout, Step, WaitBound};
use interleave_concurrency::{Barrier, WaitStatus};
use interleave_core::{Balance, IsolationLevel, Predicate, StoreError, TransactionScope};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Declarative program of one worker
///
/// # Example
///
/// ```
/// use interleave_core::IsolationLevel;
/// use interleave_harness::{Observation, WorkerSpec};
///
/// let reader = WorkerSpec::new("reader", IsolationLevel::ReadCommitted)
///     .read("accountB", "balance")
///     .signal("read")
///     .assert("reads committed value", "balance", Observation::Balance(0));
/// assert_eq!(reader.steps().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    name: String,
    isolation: IsolationLevel,
    steps: Vec<Step>,
    expectation: Expectation,
    session_cache: bool,
}

impl WorkerSpec {
    /// Empty program at `isolation`
    pub fn new(name: impl Into<String>, isolation: IsolationLevel) -> Self {
        Self {
            name: name.into(),
            isolation,
            steps: Vec::new(),
            expectation: Expectation::Commit,
            session_cache: false,
        }
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Isolation level the scope is opened at
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Program
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Declared terminal action
    pub fn expectation(&self) -> Expectation {
        self.expectation
    }

    /// Whether the scope is wrapped in a session cache
    pub fn session_cache(&self) -> bool {
        self.session_cache
    }

    /// Append an arbitrary step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Wrap this worker's scope in a session cache
    pub fn with_session_cache(mut self) -> Self {
        self.session_cache = true;
        self
    }

    /// Declare that this worker is expected to abort
    pub fn expect_abort(mut self) -> Self {
        self.expectation = Expectation::Abort;
        self
    }

    /// Create an account
    pub fn create(self, account: impl Into<String>) -> Self {
        self.step(Step::Create {
            account: account.into(),
        })
    }

    /// Read a balance into a slot
    pub fn read(self, account: impl Into<String>, slot: impl Into<String>) -> Self {
        self.step(Step::Read {
            account: account.into(),
            slot: slot.into(),
        })
    }

    /// Adjust a balance
    pub fn adjust(self, account: impl Into<String>, delta: Balance) -> Self {
        self.step(Step::Adjust {
            account: account.into(),
            delta,
        })
    }

    /// Rename an account
    pub fn rename(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.step(Step::Rename {
            from: from.into(),
            to: to.into(),
        })
    }

    /// Count matching accounts into a slot
    pub fn count(self, predicate: Predicate, slot: impl Into<String>) -> Self {
        self.step(Step::Count {
            predicate,
            slot: slot.into(),
        })
    }

    /// List account names into a slot
    pub fn list(self, slot: impl Into<String>) -> Self {
        self.step(Step::List { slot: slot.into() })
    }

    /// Drop the local view
    pub fn invalidate_local_view(self) -> Self {
        self.step(Step::InvalidateLocalView)
    }

    /// Signal a barrier
    pub fn signal(self, barrier: impl Into<String>) -> Self {
        self.step(Step::Signal {
            barrier: barrier.into(),
        })
    }

    /// Wait for a barrier without limit
    pub fn wait(self, barrier: impl Into<String>) -> Self {
        self.step(Step::Await {
            barrier: barrier.into(),
            bound: WaitBound::Unbounded,
            on_timeout: OnTimeout::Fail,
        })
    }

    /// Wait for a barrier at most the configured bounded wait
    pub fn wait_bounded(self, barrier: impl Into<String>, on_timeout: OnTimeout) -> Self {
        self.step(Step::Await {
            barrier: barrier.into(),
            bound: WaitBound::Configured,
            on_timeout,
        })
    }

    /// Wait for a barrier at most `bound`
    pub fn wait_at_most(
        self,
        barrier: impl Into<String>,
        bound: Duration,
        on_timeout: OnTimeout,
    ) -> Self {
        self.step(Step::Await {
            barrier: barrier.into(),
            bound: WaitBound::Fixed(bound),
            on_timeout,
        })
    }

    /// Assert a slot's content
    pub fn assert(
        self,
        label: impl Into<String>,
        slot: impl Into<String>,
        expected: Observation,
    ) -> Self {
        self.step(Step::Assert {
            label: label.into(),
            slot: slot.into(),
            expected,
        })
    }

    /// Commit
    pub fn commit(self) -> Self {
        self.step(Step::Commit)
    }

    /// Abort
    pub fn abort(self, reason: impl Into<String>) -> Self {
        self.step(Step::Abort {
            reason: reason.into(),
        })
    }
}

/// What a worker needs from its run
#[derive(Debug)]
pub struct WorkerEnv<'a> {
    /// Scenario name, for the tracing span
    pub scenario: &'a str,
    /// Barriers of this run, by name
    pub barriers: &'a HashMap<String, Barrier>,
    /// Bound for `WaitBound::Configured`
    pub bounded_wait: Duration,
    /// Run start; every timestamp is an offset from it
    pub clock: Instant,
}

impl WorkerEnv<'_> {
    fn now_us(&self) -> u64 {
        self.clock.elapsed().as_micros() as u64
    }

    /// Span every event of `spec`'s worker is recorded under
    pub fn span(&self, spec: &WorkerSpec) -> tracing::Span {
        tracing::info_span!(
            "worker",
            scenario = self.scenario,
            worker = %spec.name,
            isolation = %spec.isolation,
            cached = spec.session_cache,
        )
    }
}

/// Mutable execution state of one worker
struct Execution<'a> {
    spec: &'a WorkerSpec,
    env: &'a WorkerEnv<'a>,
    state: WorkerState,
    slots: HashMap<String, Observation>,
    steps: Vec<StepRecord>,
    assertions: Vec<AssertionResult>,
    failures: Vec<TimedFailure>,
    commit_version: Option<u64>,
    abort_reason: Option<String>,
}

impl<'a> Execution<'a> {
    fn new(spec: &'a WorkerSpec, env: &'a WorkerEnv<'a>) -> Self {
        Self {
            spec,
            env,
            state: WorkerState::Created,
            slots: HashMap::new(),
            steps: Vec::new(),
            assertions: Vec::new(),
            failures: Vec::new(),
            commit_version: None,
            abort_reason: None,
        }
    }

    fn stopped(&self) -> bool {
        self.state.is_terminal()
    }

    fn record(&mut self, index: usize, step: &Step, status: StepStatus) {
        self.steps.push(StepRecord {
            index,
            step: step.to_string(),
            at_us: self.env.now_us(),
            status,
        });
    }

    fn fail(&mut self, failure: ScenarioFailure) {
        tracing::warn!(failure = %failure, "worker failure");
        self.failures.push(TimedFailure {
            at_us: self.env.now_us(),
            failure,
        });
    }

    fn store_failure<T: TransactionScope>(
        &mut self,
        scope: &mut T,
        index: usize,
        step: &Step,
        error: StoreError,
    ) {
        tracing::debug!(index, step = %step, error = %error, "step failed");
        self.record(
            index,
            step,
            StepStatus::Failed {
                error: error.to_string(),
            },
        );
        self.fail(ScenarioFailure::StoreFailure {
            worker: self.spec.name.clone(),
            step: index,
            error: error.to_string(),
        });
        scope.abort("worker failed");
        self.state = WorkerState::Failed;
    }

    /// A step unwound; the store adapter is not trusted with anything else
    fn step_panicked<T: TransactionScope>(
        &mut self,
        scope: &mut T,
        index: usize,
        step: &Step,
        message: String,
    ) {
        tracing::error!(index, step = %step, %message, "step panicked");
        self.record(
            index,
            step,
            StepStatus::Failed {
                error: format!("panicked: {}", message),
            },
        );
        self.fail(ScenarioFailure::WorkerPanicked {
            worker: self.spec.name.clone(),
            message,
        });
        self.state = WorkerState::Failed;
        if panic::catch_unwind(AssertUnwindSafe(|| scope.abort("worker panicked"))).is_err() {
            tracing::error!("abort after panic panicked too");
        }
    }

    /// Record a program that never ran, firing its signals if asked
    fn record_unrun(&mut self, fire_signals: bool) {
        for (index, step) in self.spec.steps.iter().enumerate() {
            match step {
                Step::Signal { barrier } => {
                    if fire_signals {
                        if let Some(b) = self.env.barriers.get(barrier) {
                            b.signal();
                        }
                    }
                    self.record(index, step, StepStatus::Done);
                }
                _ => self.record(index, step, StepStatus::Skipped),
            }
        }
    }

    fn aborted(&mut self, index: usize, step: &Step, reason: String) {
        self.record(
            index,
            step,
            StepStatus::Aborted {
                reason: reason.clone(),
            },
        );
        match self.spec.expectation {
            Expectation::Abort => {
                tracing::info!(reason = %reason, "worker aborted as expected");
                self.state = WorkerState::Aborted;
            }
            Expectation::Commit => {
                self.fail(ScenarioFailure::UnexpectedAbort {
                    worker: self.spec.name.clone(),
                    reason: reason.clone(),
                });
                self.state = WorkerState::Failed;
            }
        }
        self.abort_reason = Some(reason);
    }

    fn commit<T: TransactionScope>(&mut self, scope: &mut T, index: usize, step: &Step) {
        match scope.commit() {
            Ok(version) => {
                self.record(index, step, StepStatus::Committed { version });
                self.state = WorkerState::Committed;
                self.commit_version = Some(version);
                tracing::info!(version, "worker committed");
                if self.spec.expectation == Expectation::Abort {
                    self.fail(ScenarioFailure::OutcomeMismatch {
                        worker: self.spec.name.clone(),
                        expected: Expectation::Abort,
                        actual: format!("committed at v{}", version),
                    });
                }
            }
            Err(e) if e.is_abort_like() => self.aborted(index, step, e.to_string()),
            Err(e) => self.store_failure(scope, index, step, e),
        }
    }

    fn observe(&mut self, index: usize, step: &Step, slot: &str, value: Observation) {
        tracing::debug!(index, step = %step, observed = %value, "step done");
        self.slots.insert(slot.to_string(), value.clone());
        self.record(index, step, StepStatus::Observed { value });
    }

    fn done(&mut self, index: usize, step: &Step) {
        tracing::debug!(index, step = %step, "step done");
        self.record(index, step, StepStatus::Done);
    }

    fn run_step<T: TransactionScope>(&mut self, scope: &mut T, index: usize, step: &Step) {
        match step {
            Step::Create { account } => match scope.create_account(account) {
                Ok(_) => self.done(index, step),
                Err(e) => self.store_failure(scope, index, step, e),
            },
            Step::Read { account, slot } => match scope.read_balance(account) {
                Ok(balance) => self.observe(index, step, slot, Observation::Balance(balance)),
                Err(e) => self.store_failure(scope, index, step, e),
            },
            Step::Adjust { account, delta } => match scope.adjust_balance(account, *delta) {
                Ok(_) => self.done(index, step),
                Err(e) => self.store_failure(scope, index, step, e),
            },
            Step::Rename { from, to } => match scope.rename_account(from, to) {
                Ok(_) => self.done(index, step),
                Err(e) => self.store_failure(scope, index, step, e),
            },
            Step::Count { predicate, slot } => match scope.count_where(predicate) {
                Ok(count) => self.observe(index, step, slot, Observation::Count(count)),
                Err(e) => self.store_failure(scope, index, step, e),
            },
            Step::List { slot } => match scope.list_accounts() {
                Ok(entries) => {
                    let names = entries.into_iter().map(|e| e.name);
                    self.observe(index, step, slot, Observation::names(names))
                }
                Err(e) => self.store_failure(scope, index, step, e),
            },
            Step::InvalidateLocalView => {
                scope.invalidate_local_view();
                self.done(index, step);
            }
            Step::Signal { barrier } => {
                // Barrier names are checked when the scenario is built
                if let Some(b) = self.env.barriers.get(barrier) {
                    let opened = b.signal();
                    tracing::debug!(index, barrier = %barrier, opened, "signalled");
                }
                self.record(index, step, StepStatus::Done);
            }
            Step::Await {
                barrier,
                bound,
                on_timeout,
            } => self.wait(scope, index, step, barrier, bound, *on_timeout),
            Step::Assert {
                label,
                slot,
                expected,
            } => self.check(index, step, label, slot, expected),
            Step::Commit => self.commit(scope, index, step),
            Step::Abort { reason } => {
                scope.abort(reason);
                self.aborted(index, step, reason.clone());
            }
        }
    }

    fn wait<T: TransactionScope>(
        &mut self,
        scope: &mut T,
        index: usize,
        step: &Step,
        barrier: &str,
        bound: &WaitBound,
        on_timeout: OnTimeout,
    ) {
        let started = Instant::now();
        let wait = match self.env.barriers.get(barrier) {
            Some(b) => b.wait(bound.resolve(self.env.bounded_wait)),
            None => WaitStatus::TimedOut,
        };
        let waited_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(index, barrier, ?wait, waited_ms, "wait finished");
        self.record(index, step, StepStatus::Waited { wait, waited_ms });

        if wait == WaitStatus::TimedOut && on_timeout == OnTimeout::Fail {
            self.fail(ScenarioFailure::BarrierTimeout {
                worker: self.spec.name.clone(),
                barrier: barrier.to_string(),
                waited_ms,
            });
            scope.abort("barrier wait timed out");
            self.state = WorkerState::Failed;
        }
    }

    fn check(
        &mut self,
        index: usize,
        step: &Step,
        label: &str,
        slot: &str,
        expected: &Observation,
    ) {
        let observed = self.slots.get(slot).cloned();
        let passed = observed.as_ref() == Some(expected);
        if passed {
            tracing::info!(label, observed = %expected, "assertion passed");
        } else {
            self.fail(ScenarioFailure::AssertionMismatch {
                worker: self.spec.name.clone(),
                label: label.to_string(),
                expected: expected.clone(),
                observed: observed.clone(),
            });
        }
        self.assertions.push(AssertionResult {
            label: label.to_string(),
            slot: slot.to_string(),
            expected: expected.clone(),
            observed,
            passed,
            at_us: self.env.now_us(),
        });
        self.record(index, step, StepStatus::Checked { passed });
    }

    fn outcome(&self) -> WorkerOutcome {
        let hard_failure = self.failures.iter().find(|f| {
            !matches!(
                f.failure,
                ScenarioFailure::AssertionMismatch { .. } | ScenarioFailure::UnexpectedAbort { .. }
            )
        });
        if let Some(timed) = hard_failure {
            return WorkerOutcome::Failed {
                error: timed.failure.to_string(),
            };
        }

        match (&self.abort_reason, self.spec.expectation) {
            (Some(reason), Expectation::Commit) => WorkerOutcome::AbortedUnexpected {
                reason: reason.clone(),
            },
            _ if self.state == WorkerState::Failed => WorkerOutcome::Failed {
                error: "worker failed".to_string(),
            },
            _ => {
                let mismatches = self.assertions.iter().filter(|a| !a.passed).count();
                if mismatches > 0 {
                    WorkerOutcome::AssertionFailed { mismatches }
                } else if let Some(reason) = &self.abort_reason {
                    WorkerOutcome::AbortedExpected {
                        reason: reason.clone(),
                    }
                } else {
                    WorkerOutcome::Committed {
                        version: self.commit_version.unwrap_or_default(),
                    }
                }
            }
        }
    }

    fn into_report(self) -> WorkerReport {
        let outcome = self.outcome();
        WorkerReport {
            worker: self.spec.name.clone(),
            isolation: self.spec.isolation,
            session_cache: self.spec.session_cache,
            expectation: self.spec.expectation,
            state: self.state,
            outcome,
            steps: self.steps,
            assertions: self.assertions,
            failures: self.failures,
        }
    }
}

/// Run `spec` on `scope` to a terminal state
///
/// The caller enters [`WorkerEnv::span`] first; `Runner` does.
pub fn execute<T: TransactionScope>(
    spec: &WorkerSpec,
    mut scope: T,
    env: &WorkerEnv<'_>,
) -> WorkerReport {
    let mut run = Execution::new(spec, env);
    run.state = WorkerState::Running;
    tracing::info!(txn_id = scope.txn_id(), "worker started");

    for (index, step) in spec.steps.iter().enumerate() {
        // Signals still fire once the worker stopped so siblings are not stranded
        if run.stopped() && !matches!(step, Step::Signal { .. }) {
            run.record(index, step, StepStatus::Skipped);
            continue;
        }
        let ran = panic::catch_unwind(AssertUnwindSafe(|| {
            run.run_step(&mut scope, index, step)
        }));
        if let Err(payload) = ran {
            run.step_panicked(&mut scope, index, step, panic_message(payload.as_ref()));
        }
    }

    if !run.stopped() {
        run.commit(&mut scope, spec.steps.len(), &Step::Commit);
    }

    run.into_report()
}

/// Report for a worker whose scope could not be opened
pub fn begin_failed(spec: &WorkerSpec, env: &WorkerEnv<'_>, error: StoreError) -> WorkerReport {
    let mut run = Execution::new(spec, env);
    run.state = WorkerState::Failed;
    run.fail(ScenarioFailure::StoreFailure {
        worker: spec.name.clone(),
        step: 0,
        error: error.to_string(),
    });
    run.record_unrun(true);
    run.into_report()
}

/// Report for a worker whose thread panicked outside any step
///
/// Where it stopped is unknown, so the whole program is reported as
/// skipped. Its signals were already fired while the thread unwound.
pub fn panicked(spec: &WorkerSpec, env: &WorkerEnv<'_>, message: String) -> WorkerReport {
    let mut run = Execution::new(spec, env);
    run.state = WorkerState::Failed;
    run.fail(ScenarioFailure::WorkerPanicked {
        worker: spec.name.clone(),
        message,
    });
    run.record_unrun(false);
    run.into_report()
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
