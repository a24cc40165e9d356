//! MemoryStore: in-memory reference store
//!
//! A lock-based multi-version store that gives each ANSI isolation level a
//! concrete, observable meaning (see [`crate::versions`] for visibility and
//! [`crate::locks`] for blocking).
//!
//! # Design Notes
//!
//! - **One critical section**: row versions and the lock table sit behind a
//!   single `parking_lot::Mutex`. Commit validation and publication happen
//!   while holding it, so they are atomic with respect to every other scope.
//! - **Blocking waits**: a scope that cannot get a lock waits on a
//!   `Condvar` that is notified whenever any transaction releases locks.
//!   Waits are bounded by `StoreConfig::lock_wait_timeout`; there is no
//!   deadlock detection, the bound breaks cycles.
//! - **Cheap clones**: `MemoryStore` is an `Arc` handle; every clone and
//!   every scope shares the same state.

use crate::config::StoreConfig;
use crate::locks::{LockRequest, LockTable};
use crate::query_log::{QueryLog, QueryLogEntry};
use crate::scope::MemoryScope;
use crate::versions::{ReadView, RowTable};
use interleave_concurrency::TransactionManager;
use interleave_core::{
    IsolationLevel, LedgerEntry, StoreError, StoreResult, TransactionalStore, TxnId,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Instant;

/// Rows and locks, guarded together
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) rows: RowTable,
    pub(crate) locks: LockTable,
}

/// State shared by a store and all of its scopes
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: StoreConfig,
    pub(crate) manager: TransactionManager,
    pub(crate) state: Mutex<StoreState>,
    /// Notified whenever a transaction releases its locks
    pub(crate) released: Condvar,
    pub(crate) query_log: Option<QueryLog>,
}

impl Shared {
    /// Append to the query log if enabled
    pub(crate) fn log<F>(&self, txn_id: TxnId, isolation: IsolationLevel, statement: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(log) = &self.query_log {
            log.record(txn_id, isolation, statement());
        }
    }

    /// Acquire `request` for `txn`, waiting for conflicting holders
    ///
    /// `target` names what is being locked in the timeout error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockWaitTimeout` once the configured bound
    /// elapses without the lock becoming available.
    pub(crate) fn acquire(
        &self,
        state: &mut MutexGuard<'_, StoreState>,
        txn: TxnId,
        request: LockRequest,
        target: &str,
    ) -> StoreResult<()> {
        let started = Instant::now();
        let deadline = started.checked_add(self.config.lock_wait_timeout());

        loop {
            let blocker = match state.locks.try_acquire(txn, request) {
                Ok(()) => return Ok(()),
                Err(holder) => holder,
            };
            tracing::trace!(txn_id = txn, blocker, lock = %request, "waiting for lock");

            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(state, deadline).timed_out(),
                None => {
                    self.released.wait(state);
                    false
                }
            };

            if timed_out {
                return match state.locks.try_acquire(txn, request) {
                    Ok(()) => Ok(()),
                    Err(holder) => {
                        let waited_ms = started.elapsed().as_millis() as u64;
                        tracing::debug!(
                            txn_id = txn,
                            blocker = holder,
                            lock = %request,
                            waited_ms,
                            "lock wait timed out"
                        );
                        Err(StoreError::LockWaitTimeout {
                            account: target.to_string(),
                            waited_ms,
                        })
                    }
                };
            }
        }
    }

    /// Give back one lock of `txn` and wake all waiters
    pub(crate) fn release_one(&self, state: &mut StoreState, txn: TxnId, request: LockRequest) {
        if state.locks.release(txn, request) {
            self.released.notify_all();
        }
    }

    /// Release every lock of `txn` and wake all waiters
    pub(crate) fn release(&self, state: &mut StoreState, txn: TxnId) {
        if state.locks.release_all(txn) {
            self.released.notify_all();
        }
    }
}

/// In-memory transactional store
///
/// # Example
///
/// ```
/// use interleave_core::{IsolationLevel, TransactionScope, TransactionalStore};
/// use interleave_storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// let mut scope = store.begin(IsolationLevel::ReadCommitted).unwrap();
/// scope.create_account("accountA").unwrap();
/// scope.adjust_balance("accountA", 100).unwrap();
/// scope.commit().unwrap();
///
/// let mut reader = store.begin(IsolationLevel::ReadCommitted).unwrap();
/// assert_eq!(reader.read_balance("accountA").unwrap(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store with default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store
    pub fn with_config(config: StoreConfig) -> Self {
        let query_log = config.query_log.then(QueryLog::new);
        Self {
            shared: Arc::new(Shared {
                config,
                manager: TransactionManager::new(0),
                state: Mutex::new(StoreState {
                    rows: RowTable::new(),
                    locks: LockTable::new(),
                }),
                released: Condvar::new(),
                query_log,
            }),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Version of the latest commit
    pub fn current_version(&self) -> u64 {
        self.shared.manager.current_version()
    }

    /// Latest committed state of every account, in id order
    pub fn committed_accounts(&self) -> Vec<LedgerEntry> {
        let state = self.shared.state.lock();
        let view = ReadView::new(0, IsolationLevel::ReadCommitted, 0);
        state.rows.scan(&view)
    }

    /// Whether any transaction currently holds a lock
    pub fn has_active_locks(&self) -> bool {
        !self.shared.state.lock().locks.is_empty()
    }

    /// Logged statements, empty when the query log is disabled
    pub fn query_log(&self) -> Vec<QueryLogEntry> {
        self.shared
            .query_log
            .as_ref()
            .map(QueryLog::entries)
            .unwrap_or_default()
    }

    /// Whether the query log is enabled
    pub fn query_log_enabled(&self) -> bool {
        self.shared.query_log.is_some()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionalStore for MemoryStore {
    type Scope = MemoryScope;

    fn begin(&self, level: IsolationLevel) -> StoreResult<MemoryScope> {
        if !self.supports(level) {
            return Err(StoreError::UnsupportedIsolationLevel(level));
        }

        // Commits allocate versions under the state lock; taking it here
        // pins the snapshot between two commits.
        let ctx = {
            let _state = self.shared.state.lock();
            self.shared.manager.begin(level)
        };
        self.shared.log(ctx.txn_id, level, || {
            format!(
                "SET TRANSACTION ISOLATION LEVEL {}; BEGIN",
                level.as_str().replace('-', " ").to_uppercase()
            )
        });
        Ok(MemoryScope::new(Arc::clone(&self.shared), ctx))
    }

    fn supports(&self, level: IsolationLevel) -> bool {
        self.shared.config.supports(level)
    }
}
