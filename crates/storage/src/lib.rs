//! Storage layer for Interleave
//!
//! This crate implements the in-memory reference store the harness runs
//! scenarios against:
//! - MemoryStore / MemoryScope: multi-version rows, per-level visibility
//! - LockTable: shared, exclusive and predicate locks with bounded waits
//! - RowTable: committed version chains plus one intent per row
//! - QueryLog: optional log of every statement in execution order
//! - StoreConfig: the `[store]` section of `interleave.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod locks;
pub mod query_log;
pub mod scope;
pub mod store;
pub mod versions;

pub use config::StoreConfig;
pub use locks::{LockRequest, LockTable};
pub use query_log::{QueryLog, QueryLogEntry};
pub use scope::MemoryScope;
pub use store::MemoryStore;
pub use versions::{ReadView, Row, RowTable, RowVersion};
