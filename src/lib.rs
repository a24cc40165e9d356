//! Interleave - deterministic transaction-interleaving harness
//!
//! Interleave runs small scenarios of concurrent transactions whose every
//! cross-transaction ordering is an explicit barrier edge, so read phenomena
//! (dirty reads, non-repeatable reads, phantoms, lost updates) reproduce the
//! same way on every run.
//!
//! # Quick Start
//!
//! ```
//! use interleave::{catalog, InterleaveConfig};
//!
//! let scenario = catalog::dirty_read_prevented()?;
//! let report = InterleaveConfig::default().run_fresh(&scenario)?;
//! assert!(report.passed, "{report}");
//! # Ok::<(), interleave::HarnessError>(())
//! ```
//!
//! # Architecture
//!
//! - `interleave-core`: store contract (`TransactionalStore`,
//!   `TransactionScope`), isolation levels, store errors
//! - `interleave-concurrency`: barriers, transaction bookkeeping, commit
//!   validation
//! - `interleave-storage`: in-memory multi-version store with locks
//! - `interleave-harness`: scenarios, workers, runner, reports, and the
//!   session-cache wrapper; knows stores only through the core traits
//!
//! Any store implementing the core traits can be driven by the runner; the
//! in-memory store is the reference implementation. [`InterleaveConfig`]
//! ties the two together and reads `interleave.toml`.

mod settings;

pub use settings::{InterleaveConfig, CONFIG_FILE_NAME};

pub use interleave_concurrency::{Barrier, WaitStatus};
pub use interleave_core::{
    AccountId, Balance, Comparison, IsolationLevel, LedgerEntry, Predicate, StoreError,
    StoreResult, TransactionScope, TransactionalStore, TxnId,
};
pub use interleave_harness::*;
pub use interleave_storage::{MemoryScope, MemoryStore, QueryLogEntry, StoreConfig};
