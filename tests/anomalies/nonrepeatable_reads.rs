//! Non-repeatable Read Tests

use crate::common::*;
use interleave::{catalog, Observation};

#[test]
fn read_committed_second_read_sees_commit() {
    let report = run_scenario(catalog::nonrepeatable_read().unwrap());
    assert!(report.passed, "{report}");

    let reader = report.worker("reader").unwrap();
    assert!(reader.session_cache);
    assert_eq!(
        reader.observed("before concurrent update"),
        Some(&Observation::Balance(0))
    );
    assert_eq!(
        reader.observed("after concurrent commit"),
        Some(&Observation::Balance(100))
    );
}

#[test]
fn repeatable_read_second_read_keeps_snapshot() {
    let report = run_scenario(catalog::nonrepeatable_read_prevented().unwrap());
    assert!(report.passed, "{report}");

    let reader = report.worker("reader").unwrap();
    assert_eq!(
        reader.observed("before concurrent update"),
        Some(&Observation::Balance(0))
    );
    assert_eq!(
        reader.observed("after concurrent commit"),
        Some(&Observation::Balance(0))
    );
}

#[test]
fn writer_commits_in_both_cases() {
    for scenario in [
        catalog::nonrepeatable_read().unwrap(),
        catalog::nonrepeatable_read_prevented().unwrap(),
    ] {
        let report = run_scenario(scenario);
        let writer = report.worker("writer").unwrap();
        assert_eq!(writer.outcome.kind(), "committed", "{report}");
    }
}
