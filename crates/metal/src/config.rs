//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default polling interval while waiting on the provider.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default time allowed for a device to become active.
pub const DEFAULT_CREATE_TIMEOUT_SECS: u64 = 1200;

/// Default time allowed for a deleted device to disappear.
pub const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 600;

/// Default timeout for a single API request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timing knobs for the device engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between state polls.
    pub poll_interval_secs: u64,
    /// Seconds a create may wait for `active`.
    pub create_timeout_secs: u64,
    /// Seconds a delete may wait for removal.
    pub delete_timeout_secs: u64,
    /// Seconds a single API request may take.
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            create_timeout_secs: DEFAULT_CREATE_TIMEOUT_SECS,
            delete_timeout_secs: DEFAULT_DELETE_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file, or defaults when `path` is `None`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or holds a zero
    /// poll interval.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if config.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }

        info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
