//! Phantom Read Tests
//!
//! A reader counts accounts with a positive balance while a writer makes
//! one of them positive.

use crate::common::*;
use interleave::{catalog, Observation, StepStatus, WaitStatus};

fn counts(report: &interleave::ScenarioReport) -> (Option<&Observation>, Option<&Observation>) {
    let reader = report.worker("reader").unwrap();
    (
        reader.observed("before concurrent update"),
        reader
            .observed("after concurrent update")
            .or_else(|| reader.observed("while update is blocked")),
    )
}

#[test]
fn read_committed_count_changes() {
    let report = run_scenario(catalog::phantom_read().unwrap());
    assert!(report.passed, "{report}");
    assert_eq!(
        counts(&report),
        (Some(&Observation::Count(0)), Some(&Observation::Count(1)))
    );
}

#[test]
fn repeatable_read_count_is_stable() {
    let report = run_scenario(catalog::phantom_read_prevented_repeatable_read().unwrap());
    assert!(report.passed, "{report}");
    assert_eq!(
        counts(&report),
        (Some(&Observation::Count(0)), Some(&Observation::Count(0)))
    );
}

#[test]
fn serializable_count_is_stable_and_blocked_writer_commits() {
    let report = run_scenario(catalog::phantom_read_prevented_serializable().unwrap());
    assert!(report.passed, "{report}");
    assert_eq!(
        counts(&report),
        (Some(&Observation::Count(0)), Some(&Observation::Count(0)))
    );

    let reader = report.worker("reader").unwrap();
    let writer = report.worker("writer").unwrap();

    // The writer cannot signal while blocked, so the bounded wait expires
    let waited = reader
        .steps
        .iter()
        .find_map(|s| match s.status {
            StepStatus::Waited { wait, .. } if s.step.contains("updated") => Some(wait),
            _ => None,
        })
        .unwrap();
    assert_eq!(waited, WaitStatus::TimedOut);

    // Blocked on the predicate lock until the reader commits, then proceeds
    assert_eq!(writer.outcome.kind(), "committed");
    assert!(writer.failures.is_empty());
}
