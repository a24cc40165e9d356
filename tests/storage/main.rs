//! Storage Integration Tests
//!
//! Isolation semantics, locking and commit validation of the in-memory
//! store, driven directly through the store contract.

#[path = "../common/mod.rs"]
mod common;

mod isolation_levels;
mod lock_blocking;
mod query_log;
