//! Pipeline configuration.
//!
//! Defaults suit a single-node deployment. Override through environment
//! variables ([`PipelineConfig::from_env`]) or a YAML document
//! ([`PipelineConfig::from_yaml_str`]); both paths end in
//! [`PipelineConfig::validate`].

use std::time::Duration;

use fiscal_state::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Longest accepted staleness threshold (7 days).
pub const MAX_STALE_AFTER_SECS: u64 = 7 * 24 * 3600;

/// Tunables of the job engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Attempts per job, including the first.
    pub max_attempts: u32,
    /// A RUNNING job older than this is failed by the sweeper.
    pub stale_after_secs: u64,
    /// Backoff after the first failed attempt.
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling.
    pub retry_max_delay_ms: u64,
    /// Concurrent workers.
    pub worker_count: usize,
    /// Idle wait between empty claims.
    pub poll_interval_ms: u64,
    /// Period of the sweeper pass.
    pub sweep_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stale_after_secs: 900,
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 600_000,
            worker_count: 4,
            poll_interval_ms: 1_000,
            sweep_interval_secs: 60,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables (all optional, defaults in parentheses):
    /// - `FISCAL_MAX_ATTEMPTS` (3)
    /// - `FISCAL_STALE_AFTER_SECS` (900)
    /// - `FISCAL_RETRY_BASE_MS` (5000)
    /// - `FISCAL_RETRY_MAX_MS` (600000)
    /// - `FISCAL_WORKER_COUNT` (4)
    /// - `FISCAL_POLL_INTERVAL_MS` (1000)
    /// - `FISCAL_SWEEP_INTERVAL_SECS` (60)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_attempts: env_parse(&lookup, "FISCAL_MAX_ATTEMPTS", defaults.max_attempts)?,
            stale_after_secs: env_parse(&lookup, "FISCAL_STALE_AFTER_SECS", defaults.stale_after_secs)?,
            retry_base_delay_ms: env_parse(&lookup, "FISCAL_RETRY_BASE_MS", defaults.retry_base_delay_ms)?,
            retry_max_delay_ms: env_parse(&lookup, "FISCAL_RETRY_MAX_MS", defaults.retry_max_delay_ms)?,
            worker_count: env_parse(&lookup, "FISCAL_WORKER_COUNT", defaults.worker_count)?,
            poll_interval_ms: env_parse(&lookup, "FISCAL_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            sweep_interval_secs: env_parse(
                &lookup,
                "FISCAL_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the bounds every consumer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be at least 1".into()));
        }
        if self.stale_after_secs == 0 || self.stale_after_secs > MAX_STALE_AFTER_SECS {
            return Err(ConfigError::Invalid(format!(
                "stale_after_secs must be in 1..={MAX_STALE_AFTER_SECS}, got {}",
                self.stale_after_secs
            )));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry_max_delay_ms must not be below retry_base_delay_ms".into(),
            ));
        }
        if self.poll_interval_ms == 0 || self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms and sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Retry policy for new jobs.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// Sweeper threshold.
    pub fn stale_threshold(&self) -> chrono::Duration {
        let secs = self.stale_after_secs.min(MAX_STALE_AFTER_SECS);
        chrono::Duration::from_std(Duration::from_secs(secs))
            .unwrap_or_else(|_| chrono::Duration::days(7))
    }

    /// Idle wait of a worker.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Sweeper period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidVar { var, value: raw }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable does not parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidVar {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// Malformed YAML.
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Out-of-range setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.stale_threshold(), chrono::Duration::minutes(15));
        assert_eq!(cfg.retry_policy().base_delay, Duration::from_secs(5));
    }

    #[test]
    fn env_overrides() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            ("FISCAL_MAX_ATTEMPTS", "5"),
            ("FISCAL_WORKER_COUNT", " 8 "),
        ]))
        .unwrap();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.poll_interval_ms, 1_000);
    }

    #[test]
    fn env_garbage_is_an_error() {
        let err = PipelineConfig::from_lookup(lookup(&[("FISCAL_STALE_AFTER_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar { var: "FISCAL_STALE_AFTER_SECS", .. }
        ));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("FISCAL_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn yaml_with_partial_keys() {
        let cfg = PipelineConfig::from_yaml_str("max_attempts: 2\nstale_after_secs: 60\n").unwrap();
        assert_eq!(cfg.max_attempts, 2);
        assert_eq!(cfg.stale_after_secs, 60);
        assert_eq!(cfg.worker_count, 4);
    }

    #[test]
    fn yaml_unknown_key_rejected() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("max_atempts: 2\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn inverted_backoff_bounds_rejected() {
        let cfg = PipelineConfig {
            retry_base_delay_ms: 10_000,
            retry_max_delay_ms: 1_000,
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }
}
