//! Task controller configuration.

use std::time::Duration;

use thiserror::Error;

/// Store key used when none is configured.
pub const DEFAULT_KEY: &str = "taskcontroller";

/// Poll interval used by `Default`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub const ENV_POLL_INTERVAL_MS: &str = "DELAYQ_POLL_INTERVAL_MS";
pub const ENV_KEY: &str = "DELAYQ_KEY";
pub const ENV_BLOCK: &str = "DELAYQ_BLOCK";
pub const ENV_MAX_ATTEMPTS: &str = "DELAYQ_MAX_ATTEMPTS";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid poll interval: {0}")]
    InvalidInterval(String),
    #[error("store key must not be empty")]
    EmptyKey,
    #[error("max attempts must be at least 1")]
    InvalidMaxAttempts,
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Task controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskControllerConfig {
    /// How often to poll for due jobs; also the deadline of every store call
    /// and the minimum lead time for new jobs.
    pub poll_interval: Duration,
    /// Sorted-set key holding this queue.
    pub key: String,
    /// Run the poll loop on the caller's thread.
    pub block: bool,
    /// Name for logging and the ticker thread.
    pub name: String,
    /// Handler failures tolerated per job before it is dropped.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for TaskControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            key: DEFAULT_KEY.to_string(),
            block: false,
            name: "task-controller".to_string(),
            max_attempts: None,
        }
    }
}

impl TaskControllerConfig {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Load from `DELAYQ_*` environment variables, defaulting unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            let ms: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: ENV_POLL_INTERVAL_MS,
                value: value.clone(),
            })?;
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(value) = lookup(ENV_KEY) {
            config.key = value;
        }

        if let Some(value) = lookup(ENV_BLOCK) {
            config.block = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: ENV_BLOCK,
                        value,
                    });
                }
            };
        }

        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            let max: u32 = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: ENV_MAX_ATTEMPTS,
                value: value.clone(),
            })?;
            config.max_attempts = Some(max);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidInterval("must be non-zero".to_string()));
        }
        self.lead_time()?;
        if self.key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidMaxAttempts);
        }
        Ok(())
    }

    /// Poll interval as a calendar duration.
    pub(crate) fn lead_time(&self) -> Result<chrono::Duration, ConfigError> {
        chrono::Duration::from_std(self.poll_interval)
            .map_err(|e| ConfigError::InvalidInterval(e.to_string()))
    }
}
