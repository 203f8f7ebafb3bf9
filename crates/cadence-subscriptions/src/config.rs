//! Worker configuration.
//!
//! Static settings loaded once at startup. The sampling rates that operators
//! change at runtime are not here; they are read per evaluation through
//! [`cadence_core::RuntimeConfig`].

use std::time::Duration;

use crate::error::{Error, Result};

const ENV_MAX_CONCURRENCY: &str = "CADENCE_SUBSCRIPTIONS_MAX_CONCURRENCY";
const ENV_EXECUTION_TIMEOUT_SECS: &str = "CADENCE_SUBSCRIPTIONS_EXECUTION_TIMEOUT_SECS";
const ENV_RESULT_TOPIC: &str = "CADENCE_SUBSCRIPTIONS_RESULT_TOPIC";
const ENV_SCHEDULER_CACHE_TTL_SECS: &str = "CADENCE_SUBSCRIPTIONS_SCHEDULER_CACHE_TTL_SECS";
const ENV_CONSISTENCY_OVERRIDE: &str = "CADENCE_SUBSCRIPTIONS_CONSISTENCY_OVERRIDE";

const DEFAULT_MAX_CONCURRENCY: usize = 32;
const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 30;
/// Default topic results are published to.
pub const DEFAULT_RESULT_TOPIC: &str = "subscription-results";

/// Settings for a [`crate::worker::SubscriptionWorker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum number of queries executing at once, across all partitions.
    pub max_concurrency: usize,
    /// How long a flush waits for one task before failing the batch.
    pub execution_timeout: Duration,
    /// Topic results are published to.
    pub result_topic: String,
    /// How long schedulers may reuse a store snapshot. Zero disables caching.
    pub scheduler_cache_ttl: Duration,
    /// Forces every evaluation consistent (`Some(true)`) or relaxed
    /// (`Some(false)`), bypassing the sample rate.
    pub consistency_override: Option<bool>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            execution_timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
            result_topic: DEFAULT_RESULT_TOPIC.to_string(),
            scheduler_cache_ttl: Duration::ZERO,
            consistency_override: None,
        }
    }
}

impl WorkerConfig {
    /// Loads the configuration from the process environment with strict validation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads the configuration with a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is present but malformed.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_concurrency = parse_positive_u64_env(
            &get_env,
            ENV_MAX_CONCURRENCY,
            DEFAULT_MAX_CONCURRENCY as u64,
        )?;
        let max_concurrency = usize::try_from(max_concurrency).map_err(|_| {
            Error::configuration(format!(
                "{ENV_MAX_CONCURRENCY} value {max_concurrency} exceeds supported range"
            ))
        })?;

        let execution_timeout_secs = parse_positive_u64_env(
            &get_env,
            ENV_EXECUTION_TIMEOUT_SECS,
            DEFAULT_EXECUTION_TIMEOUT_SECS,
        )?;

        let result_topic = match get_env(ENV_RESULT_TOPIC) {
            Some(raw) if raw.trim().is_empty() => {
                return Err(Error::configuration(format!(
                    "{ENV_RESULT_TOPIC} must not be empty"
                )));
            }
            Some(raw) => raw.trim().to_string(),
            None => DEFAULT_RESULT_TOPIC.to_string(),
        };

        let cache_ttl_secs = match get_env(ENV_SCHEDULER_CACHE_TTL_SECS) {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                Error::configuration(format!(
                    "{ENV_SCHEDULER_CACHE_TTL_SECS} must be a non-negative integer, got '{raw}'"
                ))
            })?,
            None => 0,
        };

        let consistency_override = match get_env(ENV_CONSISTENCY_OVERRIDE) {
            Some(raw) => Some(parse_bool(ENV_CONSISTENCY_OVERRIDE, &raw)?),
            None => None,
        };

        Ok(Self {
            max_concurrency,
            execution_timeout: Duration::from_secs(execution_timeout_secs),
            result_topic,
            scheduler_cache_ttl: Duration::from_secs(cache_ttl_secs),
            consistency_override,
        })
    }

    /// Checks settings built in code rather than loaded from the environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::configuration("max_concurrency must be greater than zero"));
        }
        if self.execution_timeout.is_zero() {
            return Err(Error::configuration("execution_timeout must be greater than zero"));
        }
        if self.result_topic.trim().is_empty() {
            return Err(Error::configuration("result_topic must not be empty"));
        }
        Ok(())
    }
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{key} must be true or false, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = WorkerConfig::from_env_with(|_| None).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.max_concurrency, 32);
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert_eq!(config.result_topic, DEFAULT_RESULT_TOPIC);
        assert!(config.scheduler_cache_ttl.is_zero());
        assert_eq!(config.consistency_override, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_every_key() {
        let config = WorkerConfig::from_env_with(lookup(&[
            (ENV_MAX_CONCURRENCY, "4"),
            (ENV_EXECUTION_TIMEOUT_SECS, "5"),
            (ENV_RESULT_TOPIC, "alerts"),
            (ENV_SCHEDULER_CACHE_TTL_SECS, "10"),
            (ENV_CONSISTENCY_OVERRIDE, "false"),
        ]))
        .unwrap();

        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.execution_timeout, Duration::from_secs(5));
        assert_eq!(config.result_topic, "alerts");
        assert_eq!(config.scheduler_cache_ttl, Duration::from_secs(10));
        assert_eq!(config.consistency_override, Some(false));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = WorkerConfig::from_env_with(lookup(&[(ENV_MAX_CONCURRENCY, "0")])).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(WorkerConfig::from_env_with(lookup(&[(ENV_EXECUTION_TIMEOUT_SECS, "soon")])).is_err());
        assert!(WorkerConfig::from_env_with(lookup(&[(ENV_RESULT_TOPIC, "  ")])).is_err());
        assert!(WorkerConfig::from_env_with(lookup(&[(ENV_SCHEDULER_CACHE_TTL_SECS, "-1")])).is_err());
        assert!(WorkerConfig::from_env_with(lookup(&[(ENV_CONSISTENCY_OVERRIDE, "maybe")])).is_err());
    }

    #[test]
    fn validate_catches_code_built_configs() {
        let config = WorkerConfig {
            max_concurrency: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
