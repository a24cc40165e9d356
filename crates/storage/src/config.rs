//! Store configuration
//!
//! `StoreConfig` is the `[store]` section of `interleave.toml`. Every field
//! has a default, so an empty section (or no section) is valid.

use interleave_core::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on a single lock wait.
pub const DEFAULT_LOCK_WAIT_TIMEOUT_MS: u64 = 2000;

/// Configuration of a [`MemoryStore`](crate::MemoryStore)
///
/// # Example
///
/// ```toml
/// [store]
/// lock_wait_timeout_ms = 2000
/// query_log = false
/// supported_levels = ["read-committed", "repeatable-read"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long a blocked read or write waits for a lock before failing
    /// with `LockWaitTimeout`.
    #[serde(default = "default_lock_wait_timeout_ms")]
    pub lock_wait_timeout_ms: u64,
    /// Record every store operation in an in-memory query log.
    #[serde(default)]
    pub query_log: bool,
    /// Isolation levels `begin` accepts.
    #[serde(default = "default_supported_levels")]
    pub supported_levels: Vec<IsolationLevel>,
}

fn default_lock_wait_timeout_ms() -> u64 {
    DEFAULT_LOCK_WAIT_TIMEOUT_MS
}

fn default_supported_levels() -> Vec<IsolationLevel> {
    IsolationLevel::ALL.to_vec()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_wait_timeout_ms: default_lock_wait_timeout_ms(),
            query_log: false,
            supported_levels: default_supported_levels(),
        }
    }
}

impl StoreConfig {
    /// Lock wait bound as a `Duration`
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    /// Whether `level` is in `supported_levels`
    pub fn supports(&self, level: IsolationLevel) -> bool {
        self.supported_levels.contains(&level)
    }

    /// Set the lock wait bound
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Enable or disable the query log
    pub fn with_query_log(mut self, enabled: bool) -> Self {
        self.query_log = enabled;
        self
    }

    /// Restrict the levels `begin` accepts
    pub fn with_supported_levels(mut self, levels: impl IntoIterator<Item = IsolationLevel>) -> Self {
        self.supported_levels = levels.into_iter().collect();
        self
    }
}
