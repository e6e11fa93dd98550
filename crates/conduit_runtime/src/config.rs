//! Interpreter configuration.

use crate::error::{ExecutionError, RuntimeResult};
use crate::gc::GcMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound for the default host lane width
const DEFAULT_MAX_THREADS: usize = 8;

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(DEFAULT_MAX_THREADS)
}

fn default_name() -> String {
    "conduit".to_string()
}

const fn default_use_events() -> bool {
    true
}

/// Interpreter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Name used for worker threads and log spans
    pub name: String,
    /// Workers on the host lane
    pub num_threads: usize,
    /// How the collector releases storage
    pub gc_mode: GcMode,
    /// Budget for a single cross-stream wait, in milliseconds
    pub sync_timeout_ms: Option<u64>,
    /// Insert cross-stream events; may only be disabled for programs
    /// without cross-stream edges
    pub use_events: bool,
}

impl InterpreterConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: default_name(),
            num_threads: default_threads(),
            gc_mode: GcMode::default(),
            sync_timeout_ms: None,
            use_events: default_use_events(),
        }
    }

    /// Set the name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the host lane width
    #[must_use]
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the collector mode
    #[must_use]
    pub fn with_gc_mode(mut self, gc_mode: GcMode) -> Self {
        self.gc_mode = gc_mode;
        self
    }

    /// Bound cross-stream waits
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout_ms: u64) -> Self {
        self.sync_timeout_ms = Some(timeout_ms);
        self
    }

    /// Enable or disable cross-stream events
    #[must_use]
    pub fn with_events(mut self, use_events: bool) -> Self {
        self.use_events = use_events;
        self
    }

    /// Wait budget as a duration
    #[must_use]
    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_ms.map(Duration::from_millis)
    }

    /// Check field ranges
    ///
    /// # Errors
    ///
    /// Returns error if the host lane has no threads or the name is empty
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.num_threads == 0 {
            return Err(ExecutionError::InvalidConfig {
                reason: "num_threads must be at least 1".to_string(),
            });
        }
        if self.name.is_empty() {
            return Err(ExecutionError::InvalidConfig {
                reason: "name must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Parse from JSON; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the result is invalid
    pub fn from_json(json: &str) -> RuntimeResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(conduit_core::CoreError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| ExecutionError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::new()
    }
}
