//! Engine configuration.

use std::env;
use thiserror::Error;

/// Environment variable overriding [`EngineConfig::max_commit_retries`].
pub const MAX_COMMIT_RETRIES_VAR: &str = "PIX_LEDGER_MAX_COMMIT_RETRIES";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How many times a write is re-attempted after losing an optimistic
    /// concurrency race before giving up with a conflict.
    pub max_commit_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 3,
        }
    }
}

impl EngineConfig {
    /// Defaults, overridden by whatever is set in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(MAX_COMMIT_RETRIES_VAR) {
            config.max_commit_retries = value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                var: MAX_COMMIT_RETRIES_VAR,
                value,
            })?;
        }
        Ok(config)
    }

    /// Total number of attempts, the first one included.
    pub fn attempts(&self) -> u32 {
        self.max_commit_retries.saturating_add(1)
    }
}
