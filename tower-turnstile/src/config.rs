//! Configuration for the request pipeline.
//!
//! Keys use the host's PascalCase naming, so a YAML file looks like:
//!
//! ```yaml
//! GlobalRateLimit:
//!   PermitLimit: 5
//!   WindowSeconds: 10
//!   QueueLimit: 0
//! ApiKeyDailyRateLimit:
//!   Limit: 1000
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineConfig {
    /// Per address fixed window limiter
    #[serde(default)]
    pub global_rate_limit: GlobalRateLimitConfig,

    /// Per API key daily quota
    #[serde(default)]
    pub api_key_daily_rate_limit: ApiKeyDailyRateLimitConfig,
}

/// Per address fixed window limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalRateLimitConfig {
    /// Requests admitted per address per window
    #[serde(default = "default_permit_limit")]
    pub permit_limit: usize,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Requests queued past the limit. Only 0 is supported.
    #[serde(default)]
    pub queue_limit: usize,
}

impl Default for GlobalRateLimitConfig {
    fn default() -> Self {
        Self {
            permit_limit: default_permit_limit(),
            window_seconds: default_window_seconds(),
            queue_limit: 0,
        }
    }
}

fn default_permit_limit() -> usize {
    5
}

fn default_window_seconds() -> u64 {
    10
}

/// Daily quota settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiKeyDailyRateLimitConfig {
    /// Successful calls allowed per key per UTC day. Absent means 0.
    #[serde(default)]
    pub limit: Option<u64>,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.permit_limit()?;
        self.window()?;
        if self.global_rate_limit.queue_limit != 0 {
            return Err(ConfigError::Invalid(format!(
                "GlobalRateLimit.QueueLimit must be 0, got {}",
                self.global_rate_limit.queue_limit
            )));
        }
        Ok(())
    }

    pub fn permit_limit(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.global_rate_limit.permit_limit).ok_or_else(|| {
            ConfigError::Invalid("GlobalRateLimit.PermitLimit must be greater than 0".to_string())
        })
    }

    pub fn window(&self) -> Result<Duration, ConfigError> {
        match self.global_rate_limit.window_seconds {
            0 => Err(ConfigError::Invalid(
                "GlobalRateLimit.WindowSeconds must be greater than 0".to_string(),
            )),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    /// The effective daily quota. An unset limit exhausts every key immediately.
    pub fn daily_limit(&self) -> u64 {
        self.api_key_daily_rate_limit.limit.unwrap_or(0)
    }

    /// Builder style setter, mostly for tests and embedding.
    pub fn with_daily_limit(mut self, limit: u64) -> Self {
        self.api_key_daily_rate_limit.limit = Some(limit);
        self
    }

    /// Sets the address limit. The window is configured in whole seconds.
    pub fn with_global_limit(mut self, permit_limit: usize, window_secs: u64) -> Self {
        self.global_rate_limit.permit_limit = permit_limit;
        self.global_rate_limit.window_seconds = window_secs;
        self
    }
}
