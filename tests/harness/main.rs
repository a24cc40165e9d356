//! Harness Integration Tests
//!
//! Barrier properties, run determinism, failure reporting and the
//! configuration surface.

#[path = "../common/mod.rs"]
mod common;

mod determinism;
mod failure_reporting;
