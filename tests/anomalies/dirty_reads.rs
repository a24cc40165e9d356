//! Dirty Read Tests
//!
//! A writer deposits, lets the reader look, then rolls back.

use crate::common::*;
use interleave::{catalog, Observation, WorkerOutcome, WorkerState};

#[test]
fn read_uncommitted_reader_sees_uncommitted_deposit() {
    let report = run_scenario(catalog::dirty_read_permitted().unwrap());
    assert!(report.passed, "{report}");

    let reader = report.worker("reader").unwrap();
    assert_eq!(
        reader.observed("read during concurrent update"),
        Some(&Observation::Balance(100))
    );
    assert_eq!(reader.state, WorkerState::Committed);
}

#[test]
fn rolled_back_writer_ends_expected_abort() {
    let report = run_scenario(catalog::dirty_read_permitted().unwrap());
    let writer = report.worker("writer").unwrap();
    assert_eq!(writer.state, WorkerState::Aborted);
    assert_eq!(
        writer.outcome,
        WorkerOutcome::AbortedExpected {
            reason: "transaction rollback".to_string()
        }
    );
}

#[test]
fn read_committed_reader_does_not_see_uncommitted_deposit() {
    let report = run_scenario(catalog::dirty_read_prevented().unwrap());
    assert!(report.passed, "{report}");
    assert_eq!(
        report
            .worker("reader")
            .unwrap()
            .observed("read during concurrent update"),
        Some(&Observation::Balance(0))
    );
}

#[test]
fn rollback_leaves_no_trace() {
    let store = quick_store();
    let scenario = catalog::dirty_read_permitted().unwrap();
    let report = run_within(RUN_DEADLINE, move || {
        let report = interleave::Runner::default().run(&scenario, &store).unwrap();
        assert_eq!(committed_balance(&store, "accountA"), 0);
        assert!(!store.has_active_locks());
        report
    });
    assert!(report.passed, "{report}");
}
