//! Process-wide runtime configuration.
//!
//! Runtime values (rollout percentages, sample rates) can be changed by an
//! operator at any moment. Callers must read them through [`RuntimeConfig`]
//! at every decision point instead of caching them.
//!
//! ## Implementations
//!
//! - [`InMemoryRuntimeConfig`]: settable values, for tests and embedders
//! - [`EnvRuntimeConfig`]: reads the process environment on every lookup

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Source of process-wide numeric settings.
pub trait RuntimeConfig: Send + Sync + fmt::Debug {
    /// Returns the current value for `key`, if set.
    fn get_f64(&self, key: &str) -> Option<f64>;

    /// Returns the current value for `key` as a probability in `[0, 1]`.
    ///
    /// Missing and non-finite values yield `default`; out-of-range values are clamped.
    fn rate(&self, key: &str, default: f64) -> f64 {
        match self.get_f64(key) {
            Some(value) if value.is_finite() => value.clamp(0.0, 1.0),
            _ => default,
        }
    }
}

/// In-memory runtime configuration.
///
/// ## Example
///
/// ```rust
/// use cadence_core::runtime_config::{InMemoryRuntimeConfig, RuntimeConfig};
///
/// let config = InMemoryRuntimeConfig::new();
/// config.set("snql_subscription_rollout_pct", 0.25);
/// assert_eq!(config.rate("snql_subscription_rollout_pct", 0.0), 0.25);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRuntimeConfig {
    values: RwLock<HashMap<String, f64>>,
}

impl InMemoryRuntimeConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration pre-populated with `values`.
    #[must_use]
    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let config = Self::new();
        for (key, value) in values {
            config.set(key, value);
        }
        config
    }

    /// Sets `key` to `value`, visible to the next lookup.
    pub fn set(&self, key: impl Into<String>, value: f64) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Removes `key`, restoring the caller's default.
    pub fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl RuntimeConfig for InMemoryRuntimeConfig {
    fn get_f64(&self, key: &str) -> Option<f64> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

/// Runtime configuration backed by environment variables.
///
/// A key such as `snql_subscription_rollout_pct` is looked up as
/// `{prefix}SNQL_SUBSCRIPTION_ROLLOUT_PCT`. The environment is read on every
/// call, so external changes are picked up immediately.
#[derive(Debug, Clone)]
pub struct EnvRuntimeConfig {
    prefix: String,
}

impl Default for EnvRuntimeConfig {
    fn default() -> Self {
        Self::new("CADENCE_RUNTIME_")
    }
}

impl EnvRuntimeConfig {
    /// Creates a configuration reading variables with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the environment variable name for `key`.
    #[must_use]
    pub fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_ascii_uppercase())
    }
}

impl RuntimeConfig for EnvRuntimeConfig {
    fn get_f64(&self, key: &str) -> Option<f64> {
        let name = self.var_name(key);
        let raw = std::env::var(&name).ok()?;
        match raw.trim().parse::<f64>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(variable = %name, value = %raw, "ignoring non-numeric runtime config value");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_reads_latest_value() {
        let config = InMemoryRuntimeConfig::new();
        assert_eq!(config.get_f64("rate"), None);

        config.set("rate", 0.5);
        assert_eq!(config.get_f64("rate"), Some(0.5));

        config.set("rate", 0.75);
        assert_eq!(config.get_f64("rate"), Some(0.75));

        config.remove("rate");
        assert_eq!(config.get_f64("rate"), None);
    }

    #[test]
    fn rate_clamps_and_defaults() {
        let config = InMemoryRuntimeConfig::with_values([("high", 7.0), ("low", -1.0), ("nan", f64::NAN)]);
        assert_eq!(config.rate("high", 0.0), 1.0);
        assert_eq!(config.rate("low", 0.5), 0.0);
        assert_eq!(config.rate("nan", 0.3), 0.3);
        assert_eq!(config.rate("missing", 0.9), 0.9);
    }

    #[test]
    fn env_var_name_uses_prefix() {
        let config = EnvRuntimeConfig::new("TEST_");
        assert_eq!(
            config.var_name("snql_subscription_rollout_pct"),
            "TEST_SNQL_SUBSCRIPTION_ROLLOUT_PCT"
        );
    }

    #[test]
    fn env_missing_variable_is_none() {
        let config = EnvRuntimeConfig::new("CADENCE_TEST_UNSET_PREFIX_");
        assert_eq!(config.get_f64("never_set"), None);
    }
}
