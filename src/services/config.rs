//! Run configuration for the orchestrator.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::output::{MAX_OUTPUT_BYTES, MAX_OUTPUT_LINES};
use super::worker_pool::DEFAULT_CONCURRENCY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
}

fn default_binary() -> String {
    "pi".to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_kill_grace() -> u64 {
    5
}

fn default_output_lines() -> usize {
    MAX_OUTPUT_LINES
}

fn default_output_bytes() -> usize {
    MAX_OUTPUT_BYTES
}

/// Settings for spawning child agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Child agent executable, resolved on `PATH` unless absolute.
    pub pi_binary: String,
    /// Concurrency used when the caller does not specify one.
    pub default_max_concurrency: usize,
    /// Seconds between the soft terminate and the hard kill on abort.
    pub kill_grace_secs: u64,
    /// Newest lines retained on each task result.
    pub max_output_lines: usize,
    /// UTF-8 bytes retained on each task result.
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pi_binary: default_binary(),
            default_max_concurrency: default_concurrency(),
            kill_grace_secs: default_kill_grace(),
            max_output_lines: default_output_lines(),
            max_output_bytes: default_output_bytes(),
        }
    }
}

impl RunnerConfig {
    /// Load from a TOML file; missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
