//! Failure Reporting Tests
//!
//! A failing scenario is still a completed run: every worker reaches a
//! terminal state and the report names the earliest failure.

use crate::common::*;
use interleave::{
    Balance, HarnessError, IsolationLevel, LedgerEntry, MemoryStore, Observation, OnTimeout,
    Predicate, Runner, Scenario, ScenarioFailure, StepStatus, StoreConfig, StoreResult,
    TransactionScope, TransactionalStore, TxnId, WorkerOutcome, WorkerSpec, WorkerState,
};
use std::time::Duration;

/// Store whose scopes panic right after writing to one account
struct PanickingStore {
    inner: MemoryStore,
    account: &'static str,
}

impl TransactionalStore for PanickingStore {
    type Scope = PanickingScope;

    fn begin(&self, level: IsolationLevel) -> StoreResult<Self::Scope> {
        Ok(PanickingScope {
            inner: self.inner.begin(level)?,
            account: self.account,
        })
    }

    fn supports(&self, level: IsolationLevel) -> bool {
        self.inner.supports(level)
    }
}

struct PanickingScope {
    inner: <MemoryStore as TransactionalStore>::Scope,
    account: &'static str,
}

impl TransactionScope for PanickingScope {
    fn txn_id(&self) -> TxnId {
        self.inner.txn_id()
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation_level()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn create_account(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        self.inner.create_account(name)
    }

    fn find_account(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        self.inner.find_account(name)
    }

    fn adjust_balance(&mut self, name: &str, delta: Balance) -> StoreResult<LedgerEntry> {
        let written = self.inner.adjust_balance(name, delta)?;
        if name == self.account {
            panic!("driver crashed writing {}", name);
        }
        Ok(written)
    }

    fn rename_account(&mut self, from: &str, to: &str) -> StoreResult<LedgerEntry> {
        self.inner.rename_account(from, to)
    }

    fn count_where(&mut self, predicate: &Predicate) -> StoreResult<usize> {
        self.inner.count_where(predicate)
    }

    fn list_accounts(&mut self) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.list_accounts()
    }

    fn invalidate_local_view(&mut self) {
        self.inner.invalidate_local_view();
    }

    fn commit(&mut self) -> StoreResult<u64> {
        self.inner.commit()
    }

    fn abort(&mut self, reason: &str) {
        self.inner.abort(reason);
    }
}

#[test]
fn unexpected_abort_fails_scenario_but_sibling_finishes() {
    let scenario = Scenario::builder("unexpected abort")
        .seed("a")
        .barrier("written", 1)
        .worker(
            WorkerSpec::new("writer", IsolationLevel::ReadCommitted)
                .adjust("a", 10)
                .abort("changed my mind")
                .signal("written"),
        )
        .worker(
            WorkerSpec::new("reader", IsolationLevel::ReadCommitted)
                .wait("written")
                .read("a", "a")
                .assert("rolled back", "a", Observation::Balance(0)),
        )
        .build()
        .unwrap();

    let report = run_scenario(scenario);
    assert!(!report.passed);
    assert!(report.workers.iter().all(|w| w.state.is_terminal()));

    let writer = report.worker("writer").unwrap();
    assert_eq!(writer.state, WorkerState::Failed);
    assert!(matches!(writer.outcome, WorkerOutcome::AbortedUnexpected { .. }));
    assert!(report.worker("reader").unwrap().passed());

    let first = report.first_failure.as_ref().unwrap();
    assert!(matches!(first.failure, ScenarioFailure::UnexpectedAbort { .. }));

    let err = report.ensure_passed().unwrap_err();
    assert!(matches!(err, HarnessError::ScenarioFailed { .. }));
    assert!(err.to_string().contains("unexpected abort"));
}

#[test]
fn assertion_mismatch_is_recorded_and_later_steps_run() {
    let scenario = Scenario::builder("mismatch")
        .seed("a")
        .worker(
            WorkerSpec::new("w", IsolationLevel::ReadCommitted)
                .read("a", "a")
                .assert("wrong on purpose", "a", Observation::Balance(5))
                .adjust("a", 1)
                .read("a", "after")
                .assert("own write", "after", Observation::Balance(1)),
        )
        .build()
        .unwrap();

    let report = run_scenario(scenario);
    assert!(!report.passed);
    let worker = report.worker("w").unwrap();
    assert_eq!(worker.state, WorkerState::Committed);
    assert_eq!(worker.assertion_pattern(), "FP");
    assert_eq!(worker.outcome, WorkerOutcome::AssertionFailed { mismatches: 1 });
    assert_eq!(report.signature(), "w=assertion_failed/FP");
}

#[test]
fn lock_timeout_fails_blocked_worker_only() {
    let config = interleave::InterleaveConfig::default().with_store(
        StoreConfig::default().with_lock_wait_timeout(Duration::from_millis(50)),
    );
    let scenario = Scenario::builder("lock timeout")
        .seed("a")
        .barrier("locked", 1)
        .barrier("gave up", 1)
        .worker(
            WorkerSpec::new("holder", IsolationLevel::ReadCommitted)
                .adjust("a", 1)
                .signal("locked")
                .wait("gave up"),
        )
        .worker(
            WorkerSpec::new("blocked", IsolationLevel::ReadCommitted)
                .wait("locked")
                .adjust("a", 1)
                .signal("gave up"),
        )
        .build()
        .unwrap();

    let report = run_scenario_with(config, scenario);
    assert!(report.worker("holder").unwrap().passed());

    let blocked = report.worker("blocked").unwrap();
    assert_eq!(blocked.state, WorkerState::Failed);
    match &report.first_failure.as_ref().unwrap().failure {
        ScenarioFailure::StoreFailure { worker, error, .. } => {
            assert_eq!(worker, "blocked");
            assert!(error.contains("Lock wait timeout"), "{error}");
        }
        other => panic!("unexpected failure: {other}"),
    }
}

#[test]
fn failing_bounded_wait_stops_worker() {
    let scenario = Scenario::builder("nobody signals")
        .seed("a")
        .barrier("never", 1)
        .worker(
            WorkerSpec::new("w", IsolationLevel::ReadCommitted)
                .wait_at_most("never", Duration::from_millis(10), OnTimeout::Fail)
                .adjust("a", 1),
        )
        .build()
        .unwrap();

    let report = run_scenario(scenario);
    let worker = report.worker("w").unwrap();
    assert_eq!(worker.state, WorkerState::Failed);
    assert!(matches!(
        worker.failures[0].failure,
        ScenarioFailure::BarrierTimeout { waited_ms, .. } if waited_ms >= 10
    ));
}

#[test]
fn unsupported_level_surfaces_immediately() {
    let config = interleave::InterleaveConfig::default().with_store(
        StoreConfig::default().with_supported_levels(vec![IsolationLevel::ReadCommitted]),
    );
    let scenario = Scenario::builder("unsupported")
        .worker(WorkerSpec::new("w", IsolationLevel::ReadUncommitted).list("all"))
        .build()
        .unwrap();

    let report = run_scenario_with(config, scenario);
    let worker = report.worker("w").unwrap();
    assert_eq!(worker.state, WorkerState::Failed);
    assert!(worker.assertions.is_empty());
    assert!(report
        .first_failure
        .as_ref()
        .unwrap()
        .failure
        .to_string()
        .contains("Unsupported isolation level: read-uncommitted"));
}

#[test]
fn invalid_scenarios_are_rejected_before_running() {
    let err = Scenario::builder("dangling")
        .worker(WorkerSpec::new("w", IsolationLevel::ReadCommitted).signal("nope"))
        .build()
        .unwrap_err();
    assert!(matches!(err, HarnessError::InvalidScenario { .. }));
    assert!(err.to_string().contains("undeclared barrier 'nope'"));
}

#[test]
fn panicking_step_fails_its_worker_and_releases_siblings() {
    let scenario = Scenario::builder("panicking driver")
        .seed("a")
        .barrier("done", 1)
        .worker(
            WorkerSpec::new("faulty", IsolationLevel::ReadCommitted)
                .adjust("a", 10)
                .signal("done"),
        )
        .worker(
            WorkerSpec::new("waiter", IsolationLevel::ReadCommitted)
                .wait("done")
                .adjust("a", 1)
                .read("a", "a")
                .assert("faulty write rolled back", "a", Observation::Balance(1)),
        )
        .build()
        .unwrap();

    let inner = quick_store();
    let store = PanickingStore {
        inner: inner.clone(),
        account: "a",
    };
    init_tracing();
    let report = run_within(RUN_DEADLINE, move || {
        Runner::default().run(&scenario, &store).unwrap()
    });

    assert!(!report.passed);
    assert!(report.worker("waiter").unwrap().passed(), "{report}");

    let faulty = report.worker("faulty").unwrap();
    assert_eq!(faulty.state, WorkerState::Failed);
    assert_eq!(faulty.failures[0].failure.kind(), "worker_panicked");
    assert!(faulty.failures[0]
        .failure
        .to_string()
        .contains("driver crashed writing a"));
    assert!(matches!(
        &faulty.steps[0].status,
        StepStatus::Failed { error } if error.contains("panicked")
    ));
    assert_eq!(faulty.steps[1].status, StepStatus::Done);

    assert_eq!(
        report.first_failure.as_ref().unwrap().failure.kind(),
        "worker_panicked"
    );
    assert!(!inner.has_active_locks());
    assert_eq!(committed_balance(&inner, "a"), 1);
}
