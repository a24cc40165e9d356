//! Interleaving harness
//!
//! Runs small multi-worker scenarios whose every cross-worker ordering is a
//! barrier edge, and reports what each worker observed:
//! - WorkerSpec / Step: the declarative program of one transaction
//! - Scenario: workers, barriers and seed accounts, validated at build time
//! - Runner: one OS thread per worker, common start gate, per-run barriers
//! - ScenarioReport: step history, assertion results and outcomes per worker
//! - catalog: the classic read phenomena as ready-made scenarios
//! - SessionCachedStore: scope-local identity map over any store
//! - HarnessConfig: runner settings

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod observation;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session_cache;
pub mod step;
pub mod worker;

pub use config::{HarnessConfig, DEFAULT_BOUNDED_WAIT_MS};
pub use error::{HarnessError, HarnessResult, ScenarioFailure};
pub use observation::Observation;
pub use report::{
    AssertionResult, ScenarioReport, StepRecord, StepStatus, TimedFailure, WorkerOutcome,
    WorkerReport, WorkerState,
};
pub use runner::Runner;
pub use scenario::{BarrierSpec, Scenario, ScenarioBuilder, Seed};
pub use session_cache::{CacheStats, CachedScope, SessionCachedStore};
pub use step::{Expectation, OnTimeout, Step, WaitBound};
pub use worker::{execute, WorkerEnv, WorkerSpec};
