//! Harness settings
//!
//! Only what the runner itself needs. Store settings and the config file
//! live with whoever builds the store; the `interleave` facade reads both
//! from `interleave.toml`, where these fields sit at the top level.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound for `WaitBound::Configured` barrier waits.
pub const DEFAULT_BOUNDED_WAIT_MS: u64 = 300;

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Bound applied to barrier waits declared as `WaitBound::Configured`.
    #[serde(default = "default_bounded_wait_ms")]
    pub bounded_wait_ms: u64,
}

fn default_bounded_wait_ms() -> u64 {
    DEFAULT_BOUNDED_WAIT_MS
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            bounded_wait_ms: default_bounded_wait_ms(),
        }
    }
}

impl HarnessConfig {
    /// Bounded wait as a `Duration`
    pub fn bounded_wait(&self) -> Duration {
        Duration::from_millis(self.bounded_wait_ms)
    }

    /// Set the bounded wait
    pub fn with_bounded_wait(mut self, bound: Duration) -> Self {
        self.bounded_wait_ms = bound.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Check values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` for a zero bounded wait.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.bounded_wait_ms == 0 {
            return Err(HarnessError::Config(
                "bounded_wait_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
