//! Determinism Tests
//!
//! The same scenario on a fresh store yields the same outcomes and
//! assertion pattern on every run, with or without random step delays.

use crate::common::*;
use interleave::catalog;

const RUNS: usize = 5;

#[test]
fn repeated_runs_share_a_signature() {
    for scenario in catalog::all().unwrap() {
        let expected = run_scenario(scenario.clone()).signature();
        for _ in 1..RUNS {
            let report = run_scenario(scenario.clone());
            assert_eq!(report.signature(), expected, "{}", scenario.name());
        }
    }
}

#[test]
fn jitter_does_not_change_outcomes() {
    for scenario in catalog::all().unwrap() {
        let baseline = run_scenario(scenario.clone());
        assert!(baseline.passed, "{baseline}");
        for seed in 0..3 {
            let report = run_jittered(scenario.clone(), seed);
            assert!(report.passed, "{report}");
            assert_eq!(report.signature(), baseline.signature(), "{}", scenario.name());
        }
    }
}

#[test]
fn every_run_gets_its_own_id() {
    let scenario = catalog::dirty_read_prevented().unwrap();
    let a = run_scenario(scenario.clone());
    let b = run_scenario(scenario);
    assert_ne!(a.run_id, b.run_id);
}
