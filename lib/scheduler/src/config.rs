//! Scheduler configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables.

use serde::Deserialize;
use std::time::Duration;

/// Configuration for the scheduler process.
#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    /// NATS server URL for the job queue.
    pub nats_url: String,

    /// Plan id stamped on jobs when no per-owner plan source is wired.
    #[serde(default = "default_plan_id")]
    pub default_plan_id: String,

    /// Polling sweep settings.
    #[serde(default)]
    pub poller: PollerConfig,
}

/// Settings for the polling trigger sweep.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Interval between sweeps.
    /// A slow sweep delays the next tick rather than bunching.
    #[serde(default = "default_sweep_interval", with = "seconds")]
    pub sweep_interval: Duration,

    /// Maximum workflows polled concurrently within one sweep.
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,
}

fn default_plan_id() -> String {
    "free".to_string()
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_concurrent_polls() -> usize {
    8
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            max_concurrent_polls: default_max_concurrent_polls(),
        }
    }
}

impl SchedulerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

/// Deserializes a `Duration` from a plain seconds value.
mod seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poller_config_has_sane_defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_polls, 8);
    }

    #[test]
    fn sweep_interval_deserializes_from_seconds() {
        let config: PollerConfig =
            serde_json::from_value(serde_json::json!({"sweep_interval": 30})).unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_polls, 8);
    }
}
