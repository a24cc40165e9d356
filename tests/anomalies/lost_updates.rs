//! Lost Update Tests

use crate::common::*;
use interleave::{
    catalog, InterleaveConfig, IsolationLevel, Observation, Runner, Scenario, ScenarioFailure,
    StepStatus, StoreConfig, WorkerOutcome, WorkerSpec, WorkerState,
};
use std::time::Duration;

#[test]
fn second_committer_aborts_with_conflict() {
    let report = run_scenario(catalog::lost_update_prevented().unwrap());
    assert!(report.passed, "{report}");

    let first = report.worker("first").unwrap();
    let second = report.worker("second").unwrap();
    assert!(matches!(first.outcome, WorkerOutcome::Committed { .. }));
    assert_eq!(second.state, WorkerState::Aborted);

    let reason = match &second.outcome {
        WorkerOutcome::AbortedExpected { reason } => reason.clone(),
        other => panic!("unexpected outcome: {other}"),
    };
    assert!(reason.contains("Commit conflict"), "{reason}");

    let last = second.steps.last().unwrap();
    assert!(matches!(last.status, StepStatus::Aborted { .. }));
}

#[test]
fn first_update_survives() {
    let store = quick_store();
    let scenario = catalog::lost_update_prevented().unwrap();
    let balance = run_within(RUN_DEADLINE, move || {
        Runner::default().run(&scenario, &store).unwrap();
        committed_balance(&store, "accountH")
    });
    assert_eq!(balance, 100);
}

#[test]
fn serializable_read_modify_write_ends_in_lock_timeout() {
    // Both readers hold shared locks, so neither upgrade can be granted
    let read_then_add = |name: &str, delta| {
        WorkerSpec::new(name, IsolationLevel::Serializable)
            .read("accountH", "seen")
            .assert("initial balance", "seen", Observation::Balance(0))
            .signal("both read")
            .wait("both read")
            .adjust("accountH", delta)
    };
    let scenario = Scenario::builder("serializable lost update")
        .seed("accountH")
        .barrier("both read", 2)
        .worker(read_then_add("first", 100))
        .worker(read_then_add("second", 50))
        .build()
        .unwrap();

    let store = StoreConfig::default().with_lock_wait_timeout(Duration::from_millis(100));
    let config = InterleaveConfig::default().with_store(store);
    let store = config.memory_store();
    let (report, balance) = run_within(RUN_DEADLINE, move || {
        let report = config.runner().run(&scenario, &store).unwrap();
        (report, committed_balance(&store, "accountH"))
    });

    assert!(!report.passed);
    let timeouts: Vec<_> = report
        .workers
        .iter()
        .flat_map(|w| &w.failures)
        .filter(|f| {
            matches!(&f.failure, ScenarioFailure::StoreFailure { error, .. }
                if error.contains("Lock wait timeout"))
        })
        .collect();
    assert!(!timeouts.is_empty(), "{report}");

    // At most one deposit lands; never both on top of the same read
    assert!([0, 50, 100].contains(&balance), "balance {balance}");
    assert!(report
        .workers
        .iter()
        .any(|w| w.state == WorkerState::Failed));
}
