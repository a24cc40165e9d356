//! Configuration via `interleave.toml`
//!
//! The file carries the runner's settings at the top level and the
//! in-memory store's under `[store]`. Nothing reads it implicitly: callers
//! that want file-based settings call [`InterleaveConfig::from_file`];
//! everything else uses `Default`.

use interleave_core::IsolationLevel;
use interleave_harness::{
    HarnessConfig, HarnessError, HarnessResult, Runner, Scenario, ScenarioReport,
};
use interleave_storage::{MemoryStore, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "interleave.toml";

/// Everything `interleave.toml` configures
///
/// # Example
///
/// ```toml
/// bounded_wait_ms = 300
///
/// [store]
/// lock_wait_timeout_ms = 2000
/// query_log = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleaveConfig {
    /// Runner settings, top-level keys of the file.
    #[serde(flatten)]
    pub harness: HarnessConfig,
    /// Settings for the in-memory reference store.
    #[serde(default)]
    pub store: StoreConfig,
}

impl InterleaveConfig {
    /// Bounded wait as a `Duration`
    pub fn bounded_wait(&self) -> Duration {
        self.harness.bounded_wait()
    }

    /// Set the bounded wait
    pub fn with_bounded_wait(mut self, bound: Duration) -> Self {
        self.harness = self.harness.with_bounded_wait(bound);
        self
    }

    /// Replace the store section
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Runner built from the top-level settings
    pub fn runner(&self) -> Runner {
        Runner::new(self.harness.clone())
    }

    /// Fresh in-memory store built from the `[store]` section
    pub fn memory_store(&self) -> MemoryStore {
        MemoryStore::with_config(self.store.clone())
    }

    /// Run `scenario` against a fresh in-memory store
    pub fn run_fresh(&self, scenario: &Scenario) -> HarnessResult<ScenarioReport> {
        self.runner().run(scenario, &self.memory_store())
    }

    /// Check values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` for a zero bounded wait, a zero lock
    /// wait timeout, or an empty level list.
    pub fn validate(&self) -> HarnessResult<()> {
        self.harness.validate()?;
        if self.store.lock_wait_timeout_ms == 0 {
            return Err(HarnessError::Config(
                "store.lock_wait_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.store.supported_levels.is_empty() {
            return Err(HarnessError::Config(
                "store.supported_levels must name at least one level".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> HarnessResult<Self> {
        let config: InterleaveConfig = toml::from_str(content)
            .map_err(|e| HarnessError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Interleave harness configuration
#
# Upper bound (ms) for barrier waits declared as bounded. A bounded wait that
# expires either lets the worker proceed or fails it, per step.
bounded_wait_ms = 300

[store]
# How long (ms) a blocked read or write waits for a lock before failing.
lock_wait_timeout_ms = 2000

# Record every statement in an in-memory query log (diagnostics only).
query_log = false

# Isolation levels the store accepts at begin.
supported_levels = ["read-uncommitted", "read-committed", "repeatable-read", "serializable"]
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            HarnessError::Config(msg) => {
                HarnessError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> HarnessResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                HarnessError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            HarnessError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Levels the configured store accepts
    pub fn supported_levels(&self) -> &[IsolationLevel] {
        &self.store.supported_levels
    }
}
