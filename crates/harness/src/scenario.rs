//! Scenario definitions
//!
//! A [`Scenario`] is a named set of workers, the barriers they synchronize
//! on, and the accounts seeded before the run. Scenarios are immutable once
//! built; [`ScenarioBuilder::build`] checks them for consistency so that a
//! run never starts on a definition that could only hang or misreport.

use crate::error::{HarnessError, HarnessResult};
use crate::worker::WorkerSpec;
use interleave_core::Balance;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A barrier and the number of signals that open it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierSpec {
    /// Barrier name
    pub name: String,
    /// Signals required to open it
    pub required: usize,
}

/// An account committed before any worker starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    /// Account name
    pub name: String,
    /// Initial balance
    pub balance: Balance,
}

/// A validated interleaving scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    name: String,
    description: String,
    workers: Vec<WorkerSpec>,
    barriers: Vec<BarrierSpec>,
    seeds: Vec<Seed>,
}

impl Scenario {
    /// Start building a scenario
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder {
            name: name.into(),
            description: String::new(),
            workers: Vec::new(),
            barriers: Vec::new(),
            seeds: Vec::new(),
        }
    }

    /// Scenario name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Workers, in declaration order
    pub fn workers(&self) -> &[WorkerSpec] {
        &self.workers
    }

    /// Barriers
    pub fn barriers(&self) -> &[BarrierSpec] {
        &self.barriers
    }

    /// Seeded accounts
    pub fn seeds(&self) -> &[Seed] {
        &self.seeds
    }

    /// Worker by name
    pub fn worker(&self, name: &str) -> Option<&WorkerSpec> {
        self.workers.iter().find(|w| w.name() == name)
    }
}

/// Builder for [`Scenario`]
///
/// # Example
///
/// ```
/// use interleave_core::IsolationLevel;
/// use interleave_harness::{Observation, Scenario, WorkerSpec};
///
/// let scenario = Scenario::builder("committed read")
///     .seed("accountB")
///     .barrier("written", 1)
///     .worker(
///         WorkerSpec::new("writer", IsolationLevel::ReadCommitted)
///             .adjust("accountB", 100)
///             .signal("written"),
///     )
///     .worker(
///         WorkerSpec::new("reader", IsolationLevel::ReadCommitted)
///             .wait("written")
///             .read("accountB", "b")
///             .assert("sees committed value", "b", Observation::Balance(0)),
///     )
///     .build()
///     .unwrap();
/// assert_eq!(scenario.workers().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    name: String,
    description: String,
    workers: Vec<WorkerSpec>,
    barriers: Vec<BarrierSpec>,
    seeds: Vec<Seed>,
}

impl ScenarioBuilder {
    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a barrier opened by `required` signals
    pub fn barrier(mut self, name: impl Into<String>, required: usize) -> Self {
        self.barriers.push(BarrierSpec {
            name: name.into(),
            required,
        });
        self
    }

    /// Seed an account with a zero balance
    pub fn seed(self, name: impl Into<String>) -> Self {
        self.seed_with_balance(name, 0)
    }

    /// Seed an account with `balance`
    pub fn seed_with_balance(mut self, name: impl Into<String>, balance: Balance) -> Self {
        self.seeds.push(Seed {
            name: name.into(),
            balance,
        });
        self
    }

    /// Add a worker
    pub fn worker(mut self, worker: WorkerSpec) -> Self {
        self.workers.push(worker);
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::InvalidScenario` if the scenario has no
    /// workers, repeats a worker, barrier or seed name, declares a barrier
    /// that can never open, or refers to an undeclared barrier.
    pub fn build(self) -> HarnessResult<Scenario> {
        let name = self.name.as_str();
        if self.workers.is_empty() {
            return Err(HarnessError::invalid(name, "no workers"));
        }

        let mut worker_names = HashSet::new();
        for worker in &self.workers {
            if !worker_names.insert(worker.name()) {
                return Err(HarnessError::invalid(
                    name,
                    format!("duplicate worker '{}'", worker.name()),
                ));
            }
        }

        let mut barrier_names = HashSet::new();
        for barrier in &self.barriers {
            if barrier.required == 0 {
                return Err(HarnessError::invalid(
                    name,
                    format!("barrier '{}' requires no signals", barrier.name),
                ));
            }
            if !barrier_names.insert(barrier.name.as_str()) {
                return Err(HarnessError::invalid(
                    name,
                    format!("duplicate barrier '{}'", barrier.name),
                ));
            }
        }

        let mut seed_names = HashSet::new();
        for seed in &self.seeds {
            if !seed_names.insert(seed.name.as_str()) {
                return Err(HarnessError::invalid(
                    name,
                    format!("account '{}' seeded twice", seed.name),
                ));
            }
        }

        for worker in &self.workers {
            for step in worker.steps() {
                if let Some(barrier) = step.barrier() {
                    if !barrier_names.contains(barrier) {
                        return Err(HarnessError::invalid(
                            name,
                            format!(
                                "worker '{}' refers to undeclared barrier '{}'",
                                worker.name(),
                                barrier
                            ),
                        ));
                    }
                }
            }
        }

        Ok(Scenario {
            name: self.name,
            description: self.description,
            workers: self.workers,
            barriers: self.barriers,
            seeds: self.seeds,
        })
    }
}
