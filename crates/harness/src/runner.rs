//! Scenario runner
//!
//! Runs every worker of a scenario on its own OS thread against one shared
//! store and collects a [`ScenarioReport`].
//!
//! ## Ordering
//!
//! Threads are spawned one after another, but none of them executes a step
//! before all are spawned: every worker first waits on a start gate the
//! runner opens last. After that the only ordering between workers is the
//! scenario's barrier wiring and whatever blocking the store does.
//!
//! ## Termination
//!
//! `run` returns once every worker reached a terminal state. A worker stuck
//! on an unbounded wait nobody signals keeps `run` from returning; that is a
//! scenario bug, and callers that need a guarantee run the scenario under an
//! outer deadline.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::report::{ScenarioReport, WorkerReport};
use crate::scenario::Scenario;
use crate::session_cache::CachedScope;
use crate::step::Step;
use crate::worker::{begin_failed, execute, panic_message, panicked, WorkerEnv, WorkerSpec};
use chrono::Utc;
use interleave_concurrency::Barrier;
use interleave_core::{IsolationLevel, StoreResult, TransactionScope, TransactionalStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use uuid::Uuid;

/// Runs scenarios
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: HarnessConfig,
}

impl Runner {
    /// Runner with the given configuration
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Seed `store`, run every worker in parallel and collect the report
    ///
    /// A scenario that fails is still a completed run: the returned report
    /// says so. Use [`ScenarioReport::ensure_passed`] to turn it into an
    /// error.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Setup` if seeding fails
    /// - `HarnessError::Spawn` if a worker thread cannot be started; workers
    ///   already spawned exit without touching the store
    pub fn run<S: TransactionalStore>(
        &self,
        scenario: &Scenario,
        store: &S,
    ) -> HarnessResult<ScenarioReport> {
        let run_id = Uuid::new_v4();
        tracing::info!(
            %run_id,
            scenario = scenario.name(),
            workers = scenario.workers().len(),
            "scenario starting"
        );

        seed(scenario, store).map_err(|source| HarnessError::Setup {
            scenario: scenario.name().to_string(),
            source,
        })?;

        let barriers: HashMap<String, Barrier> = scenario
            .barriers()
            .iter()
            .map(|b| (b.name.clone(), Barrier::new(b.name.clone(), b.required)))
            .collect();
        let start_gate = Barrier::new("start", 1);
        let cancelled = AtomicBool::new(false);

        let started_at = Utc::now();
        let env = WorkerEnv {
            scenario: scenario.name(),
            barriers: &barriers,
            bounded_wait: self.config.bounded_wait(),
            clock: Instant::now(),
        };

        let workers = thread::scope(|s| {
            let mut handles = Vec::with_capacity(scenario.workers().len());
            let mut spawn_error = None;

            for spec in scenario.workers() {
                let env = &env;
                let start_gate = &start_gate;
                let cancelled = &cancelled;
                let spawned = thread::Builder::new()
                    .name(format!("worker-{}", spec.name()))
                    .spawn_scoped(s, move || {
                        start_gate.wait(None);
                        if cancelled.load(Ordering::Acquire) {
                            return None;
                        }
                        let _release = ReleaseOnPanic { spec, env };
                        Some(run_worker(spec, store, env))
                    });

                match spawned {
                    Ok(handle) => handles.push((spec, handle)),
                    Err(e) => {
                        spawn_error = Some(HarnessError::Spawn {
                            worker: spec.name().to_string(),
                            reason: e.to_string(),
                        });
                        cancelled.store(true, Ordering::Release);
                        break;
                    }
                }
            }

            start_gate.signal();

            let mut reports = Vec::with_capacity(handles.len());
            for (spec, handle) in handles {
                match handle.join() {
                    Ok(Some(report)) => reports.push(report),
                    Ok(None) => {}
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(
                            scenario = scenario.name(),
                            worker = spec.name(),
                            %message,
                            "worker panicked"
                        );
                        reports.push(panicked(spec, &env, message));
                    }
                }
            }

            match spawn_error {
                Some(e) => Err(e),
                None => Ok(reports),
            }
        })?;

        let duration_us = env.clock.elapsed().as_micros() as u64;
        let report = ScenarioReport::new(run_id, scenario.name(), started_at, duration_us, workers);

        if report.passed {
            tracing::info!(
                %run_id,
                scenario = scenario.name(),
                signature = %report.signature(),
                duration_us,
                "scenario passed"
            );
        } else {
            tracing::warn!(
                %run_id,
                scenario = scenario.name(),
                signature = %report.signature(),
                first_failure = ?report.first_failure.as_ref().map(|f| f.failure.to_string()),
                "scenario failed"
            );
        }
        Ok(report)
    }
}

/// Commit the scenario's seed accounts in one read-committed scope
fn seed<S: TransactionalStore>(scenario: &Scenario, store: &S) -> StoreResult<()> {
    if scenario.seeds().is_empty() {
        return Ok(());
    }
    let mut setup = store.begin(IsolationLevel::ReadCommitted)?;
    for seed in scenario.seeds() {
        setup.create_account(&seed.name)?;
        if seed.balance != 0 {
            setup.adjust_balance(&seed.name, seed.balance)?;
        }
    }
    let version = setup.commit()?;
    tracing::debug!(
        scenario = scenario.name(),
        accounts = scenario.seeds().len(),
        version,
        "seeded"
    );
    Ok(())
}

fn run_worker<S: TransactionalStore>(
    spec: &WorkerSpec,
    store: &S,
    env: &WorkerEnv<'_>,
) -> WorkerReport {
    let _span = env.span(spec).entered();
    let scope = match store.begin(spec.isolation()) {
        Ok(scope) => scope,
        Err(e) => {
            tracing::warn!(error = %e, "begin failed");
            return begin_failed(spec, env, e);
        }
    };
    if spec.session_cache() {
        execute(spec, CachedScope::new(scope), env)
    } else {
        execute(spec, scope, env)
    }
}

/// Signals every barrier a worker signals if its thread unwinds
///
/// Panics inside a step are caught by the worker itself; this covers the
/// rest (`begin`, wrapping the scope). Siblings waiting on those barriers
/// would otherwise never finish.
struct ReleaseOnPanic<'a> {
    spec: &'a WorkerSpec,
    env: &'a WorkerEnv<'a>,
}

impl Drop for ReleaseOnPanic<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        for barrier in self.spec.steps().iter().filter_map(|step| match step {
            Step::Signal { barrier } => Some(barrier),
            _ => None,
        }) {
            if let Some(b) = self.env.barriers.get(barrier) {
                b.signal();
            }
        }
    }
}
