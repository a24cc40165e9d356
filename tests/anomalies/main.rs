//! Anomaly Integration Tests
//!
//! Runs every canned scenario against the in-memory store and checks what
//! each worker observed and how it ended.

#[path = "../common/mod.rs"]
mod common;

mod dirty_reads;
mod lost_updates;
mod nonrepeatable_reads;
mod phantom_reads;
