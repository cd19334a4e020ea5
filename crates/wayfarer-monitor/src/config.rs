//! Monitor configuration loading.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the background task monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Fixed polling cadence against the status endpoint.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Polls allowed before a task is forced to a timeout error.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// Age beyond which a persisted non-terminal task is declared stale at
    /// startup.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Entries kept in the rolling thought-process log.
    #[serde(default = "default_thought_log_depth")]
    pub thought_log_depth: usize,
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_stale_after_secs() -> u64 {
    3_600
}

fn default_thought_log_depth() -> usize {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            stale_after_secs: default_stale_after_secs(),
            thought_log_depth: default_thought_log_depth(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }
}

/// Load monitor configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: MonitorConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &MonitorConfig) -> Result<(), ConfigError> {
    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }
    if config.max_poll_attempts == 0 {
        return Err(ConfigError::Invalid(
            "max_poll_attempts must be > 0".to_string(),
        ));
    }
    if config.stale_after_secs == 0 {
        return Err(ConfigError::Invalid(
            "stale_after_secs must be > 0".to_string(),
        ));
    }
    if config.thought_log_depth == 0 {
        return Err(ConfigError::Invalid(
            "thought_log_depth must be > 0".to_string(),
        ));
    }
    Ok(())
}
