//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from any suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use interleave::{
    Balance, InterleaveConfig, IsolationLevel, LedgerEntry, MemoryStore, Predicate, Runner,
    Scenario, ScenarioReport, StoreConfig, StoreResult, TransactionScope, TransactionalStore, TxnId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::mpsc;
use std::sync::Once;
use std::thread;
use std::time::Duration;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured per test and shown only for failing tests.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .with_thread_names(true)
            .try_init();
    });
}

/// Outer deadline for a whole scenario run.
///
/// A scenario that hangs is an authoring bug; this turns the hang into a
/// test failure instead of a stuck CI job.
pub const RUN_DEADLINE: Duration = Duration::from_secs(20);

/// Run `work` on its own thread and panic if it does not finish in time.
pub fn run_within<T, F>(deadline: Duration, work: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("deadline".to_string())
        .spawn(move || {
            let _ = tx.send(work());
        })
        .expect("Failed to spawn deadline thread");
    match rx.recv_timeout(deadline) {
        Ok(value) => value,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("did not finish within {:?}", deadline)
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => panic!("work panicked"),
    }
}

/// Run a scenario on a fresh in-memory store under [`RUN_DEADLINE`].
pub fn run_scenario(scenario: Scenario) -> ScenarioReport {
    run_scenario_with(InterleaveConfig::default(), scenario)
}

/// Run a scenario on a fresh store built from `config` under [`RUN_DEADLINE`].
pub fn run_scenario_with(config: InterleaveConfig, scenario: Scenario) -> ScenarioReport {
    init_tracing();
    run_within(RUN_DEADLINE, move || {
        config
            .run_fresh(&scenario)
            .expect("Scenario run failed to start")
    })
}

/// Run a scenario on a fresh jittered store under [`RUN_DEADLINE`].
pub fn run_jittered(scenario: Scenario, seed: u64) -> ScenarioReport {
    init_tracing();
    run_within(RUN_DEADLINE, move || {
        let store = JitterStore::new(MemoryStore::new(), seed, Duration::from_millis(3));
        Runner::default()
            .run(&scenario, &store)
            .expect("Scenario run failed to start")
    })
}

// ============================================================================
// Store helpers
// ============================================================================

/// A store with short lock waits so blocking tests stay fast.
pub fn quick_store() -> MemoryStore {
    MemoryStore::with_config(
        StoreConfig::default().with_lock_wait_timeout(Duration::from_millis(100)),
    )
}

/// Commit `accounts` (name, balance) in one read-committed scope.
pub fn seed<S: TransactionalStore>(store: &S, accounts: &[(&str, Balance)]) {
    let mut setup = store
        .begin(IsolationLevel::ReadCommitted)
        .expect("Failed to begin setup scope");
    for (name, balance) in accounts {
        setup.create_account(name).expect("Failed to create account");
        if *balance != 0 {
            setup
                .adjust_balance(name, *balance)
                .expect("Failed to seed balance");
        }
    }
    setup.commit().expect("Failed to commit seed");
}

/// Committed balance of `name`, read in a fresh read-committed scope.
pub fn committed_balance<S: TransactionalStore>(store: &S, name: &str) -> Balance {
    let mut scope = store
        .begin(IsolationLevel::ReadCommitted)
        .expect("Failed to begin");
    let balance = scope.read_balance(name).expect("Failed to read");
    scope.abort("inspection");
    balance
}

/// Committed names in id order.
pub fn committed_names(store: &MemoryStore) -> Vec<String> {
    store
        .committed_accounts()
        .into_iter()
        .map(|e| e.name)
        .collect()
}

// ============================================================================
// JitterStore - random delays before every store call
// ============================================================================

/// Wraps a store and sleeps a random, seeded amount before each operation.
///
/// Barrier-wired scenarios must produce the same outcome no matter how the
/// workers' steps drift against each other.
pub struct JitterStore<S> {
    inner: S,
    seed: u64,
    max_delay: Duration,
    scopes: std::sync::atomic::AtomicU64,
}

impl<S> JitterStore<S> {
    pub fn new(inner: S, seed: u64, max_delay: Duration) -> Self {
        Self {
            inner,
            seed,
            max_delay,
            scopes: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: TransactionalStore> TransactionalStore for JitterStore<S> {
    type Scope = JitterScope<S::Scope>;

    fn begin(&self, level: IsolationLevel) -> StoreResult<Self::Scope> {
        let n = self
            .scopes
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(n));
        let max_us = self.max_delay.as_micros() as u64;
        thread::sleep(Duration::from_micros(rng.gen_range(0..=max_us)));
        Ok(JitterScope {
            inner: self.inner.begin(level)?,
            rng,
            max_us,
        })
    }

    fn supports(&self, level: IsolationLevel) -> bool {
        self.inner.supports(level)
    }
}

pub struct JitterScope<T> {
    inner: T,
    rng: StdRng,
    max_us: u64,
}

impl<T> JitterScope<T> {
    fn pause(&mut self) {
        let us = self.rng.gen_range(0..=self.max_us);
        thread::sleep(Duration::from_micros(us));
    }
}

impl<T: TransactionScope> TransactionScope for JitterScope<T> {
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
        self.pause();
        self.inner.create_account(name)
    }

    fn find_account(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        self.pause();
        self.inner.find_account(name)
    }

    fn adjust_balance(&mut self, name: &str, delta: Balance) -> StoreResult<LedgerEntry> {
        self.pause();
        self.inner.adjust_balance(name, delta)
    }

    fn rename_account(&mut self, from: &str, to: &str) -> StoreResult<LedgerEntry> {
        self.pause();
        self.inner.rename_account(from, to)
    }

    fn count_where(&mut self, predicate: &Predicate) -> StoreResult<usize> {
        self.pause();
        self.inner.count_where(predicate)
    }

    fn list_accounts(&mut self) -> StoreResult<Vec<LedgerEntry>> {
        self.pause();
        self.inner.list_accounts()
    }

    fn invalidate_local_view(&mut self) {
        self.inner.invalidate_local_view();
    }

    fn commit(&mut self) -> StoreResult<u64> {
        self.pause();
        self.inner.commit()
    }

    fn abort(&mut self, reason: &str) {
        self.inner.abort(reason);
    }
}
