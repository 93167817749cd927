//! Reader configuration, usually loaded from a TOML file.
//!
//! ```toml
//! queue = "jobs"
//! track_outstanding = true
//! stats_scope = "kestrel/jobs"
//!
//! [retry]
//! initial_backoff_ms = 100
//! max_backoff_ms = 10000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use grabby_member::RetryPolicy;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Queue to read on every member.
    pub queue: String,
    /// Count received/acked/aborted messages and in-flight reads.
    #[serde(default)]
    pub track_outstanding: bool,
    /// Prefix for every metric name.
    #[serde(default)]
    pub stats_scope: Option<String>,
    /// Capacity of the merged message channel.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Passed through to the member factory.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

fn default_buffer() -> usize {
    1
}

impl ReaderConfig {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            track_outstanding: false,
            stats_scope: None,
            buffer: default_buffer(),
            retry: None,
        }
    }

    pub fn with_tracking(mut self, track_outstanding: bool) -> Self {
        self.track_outstanding = track_outstanding;
        self
    }

    pub fn with_stats_scope(mut self, scope: &str) -> Self {
        self.stats_scope = Some(scope.to_string());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ReaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(ConfigError::Invalid("queue name is empty".to_string()));
        }
        if self.buffer == 0 {
            return Err(ConfigError::Invalid("buffer must be at least 1".to_string()));
        }
        if let Some(retry) = &self.retry {
            if retry.initial_backoff_ms > retry.max_backoff_ms {
                return Err(ConfigError::Invalid(format!(
                    "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                    retry.initial_backoff_ms, retry.max_backoff_ms
                )));
            }
            if retry.multiplier.is_nan() || retry.multiplier < 1.0 {
                return Err(ConfigError::Invalid(
                    "retry.multiplier must be at least 1.0".to_string(),
                ));
            }
        }
        Ok(())
    }
}
