//! Probabilistic per-evaluation decisions.
//!
//! Three decisions are sampled independently for every evaluation, each
//! against a rate read from [`RuntimeConfig`] at the moment of the decision:
//!
//! | Key | Default | Decision |
//! |-----|---------|----------|
//! | `snql_subscription_rollout_pct` | 0.0 | Delegate routes to its structured side |
//! | `subscription_consistent_sample_rate` | 1.0 | Evaluation reads with strong consistency |
//! | `subscription_delegate_comparison_pct` | 0.0 | Delegate also runs the other side for comparison |
//!
//! Nothing is persisted: re-evaluating a task may make a different choice.
//!
//! ## Consistency precedence
//!
//! An explicit override (see [`crate::config::WorkerConfig::consistency_override`])
//! always wins. Only when no override is set does the sample rate decide.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cadence_core::RuntimeConfig;

/// Runtime configuration keys read by the sampler.
pub mod keys {
    /// Probability that a Delegate evaluation uses its structured side.
    pub const ROLLOUT_PCT: &str = "snql_subscription_rollout_pct";
    /// Probability that an evaluation runs in consistent mode.
    pub const CONSISTENT_SAMPLE_RATE: &str = "subscription_consistent_sample_rate";
    /// Probability that a Delegate evaluation is compared against its other side.
    pub const DELEGATE_COMPARISON_PCT: &str = "subscription_delegate_comparison_pct";
}

/// Default structured rollout.
pub const DEFAULT_ROLLOUT_PCT: f64 = 0.0;
/// Default consistent sample rate.
pub const DEFAULT_CONSISTENT_SAMPLE_RATE: f64 = 1.0;
/// Default delegate comparison rate.
pub const DEFAULT_DELEGATE_COMPARISON_PCT: f64 = 0.0;

/// Returns true when `roll` (drawn from `[0, 1)`) falls under `rate`.
///
/// A rate of 1.0 always hits and 0.0 never does.
#[must_use]
pub fn sample(roll: f64, rate: f64) -> bool {
    roll < rate
}

/// Draws the random decisions an evaluation needs.
#[derive(Debug)]
pub struct Sampler {
    config: Arc<dyn RuntimeConfig>,
    rng: Mutex<StdRng>,
}

impl Sampler {
    /// Creates a sampler seeded from the operating system.
    #[must_use]
    pub fn new(config: Arc<dyn RuntimeConfig>) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a sampler with a fixed seed, for reproducible tests.
    #[must_use]
    pub fn with_seed(config: Arc<dyn RuntimeConfig>, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns the runtime configuration the sampler reads.
    #[must_use]
    pub fn config(&self) -> &Arc<dyn RuntimeConfig> {
        &self.config
    }

    /// Draws a value from `[0, 1)`.
    pub fn roll(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen::<f64>()
    }

    /// Returns the current structured rollout percentage.
    #[must_use]
    pub fn rollout_pct(&self) -> f64 {
        self.config.rate(keys::ROLLOUT_PCT, DEFAULT_ROLLOUT_PCT)
    }

    /// Decides whether an evaluation runs in consistent mode.
    pub fn consistent(&self, override_consistency: Option<bool>) -> bool {
        if let Some(forced) = override_consistency {
            return forced;
        }
        let rate = self
            .config
            .rate(keys::CONSISTENT_SAMPLE_RATE, DEFAULT_CONSISTENT_SAMPLE_RATE);
        sample(self.roll(), rate)
    }

    /// Decides whether a Delegate evaluation also runs its other side.
    pub fn compare_delegate(&self) -> bool {
        let rate = self.config.rate(
            keys::DELEGATE_COMPARISON_PCT,
            DEFAULT_DELEGATE_COMPARISON_PCT,
        );
        sample(self.roll(), rate)
    }
}
