//! Metrics emitted by the subscription engine.
//!
//! The engine records through the [`MetricsBackend`] trait so the sink can be
//! swapped: [`FacadeMetrics`] forwards to the `metrics` crate facade (and from
//! there to whichever exporter the process installed), while
//! [`RecordingMetrics`] keeps every call in memory for assertions.
//!
//! Emission never fails. Backends swallow their own errors so that scheduling
//! and execution are unaffected by the metrics path.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Tags | Description |
//! |--------|------|------|-------------|
//! | `consistent` | Counter | - | Evaluations that ran in consistent mode |
//! | `scheduler.tasks` | Counter | `partition` | Tasks produced by the scheduler |
//! | `scheduler.find` | Timing | `partition` | Time spent expanding a tick |
//! | `scheduler.cache.hit` | Counter | `partition` | Ticks served from the subscription cache |
//! | `scheduler.cache.miss` | Counter | `partition` | Ticks that re-read the store |
//! | `execution.duration` | Timing | `source` | Query execution latency |
//! | `execution.failed` | Counter | `kind` | Isolated execution failures |
//! | `results.published` | Counter | `partition` | Result messages produced |
//! | `delegate.routed` | Counter | `source` | Delegate evaluations by chosen side |
//! | `delegate.comparison` | Counter | `outcome` | Delegate comparison outcomes |
//!
//! With [`FacadeMetrics`] the names are prefixed with `cadence_subscriptions_`
//! and dots become underscores, e.g. `cadence_subscriptions_scheduler_cache_hit`.

mod recording;

use std::fmt;
use std::time::{Duration, Instant};

use metrics::{Label, counter, gauge, histogram};

pub use recording::{MetricCall, RecordingMetrics};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: evaluations run in consistent mode.
    pub const CONSISTENT: &str = "consistent";
    /// Counter: tasks produced by a scheduler.
    pub const SCHEDULER_TASKS: &str = "scheduler.tasks";
    /// Timing: scheduler tick expansion.
    pub const SCHEDULER_FIND: &str = "scheduler.find";
    /// Counter: scheduler cache hits.
    pub const SCHEDULER_CACHE_HIT: &str = "scheduler.cache.hit";
    /// Counter: scheduler cache misses.
    pub const SCHEDULER_CACHE_MISS: &str = "scheduler.cache.miss";
    /// Timing: query execution latency.
    pub const EXECUTION_DURATION: &str = "execution.duration";
    /// Counter: isolated execution failures.
    pub const EXECUTION_FAILED: &str = "execution.failed";
    /// Counter: result messages published.
    pub const RESULTS_PUBLISHED: &str = "results.published";
    /// Counter: Delegate routing decisions.
    pub const DELEGATE_ROUTED: &str = "delegate.routed";
    /// Counter: Delegate comparison outcomes.
    pub const DELEGATE_COMPARISON: &str = "delegate.comparison";
}

/// Tag keys used across metrics.
pub mod labels {
    /// Source partition index.
    pub const PARTITION: &str = "partition";
    /// Query representation (legacy, structured).
    pub const SOURCE: &str = "source";
    /// Execution error kind.
    pub const KIND: &str = "kind";
    /// Comparison outcome: match, mismatch, error or timeout.
    pub const OUTCOME: &str = "outcome";
}

/// Sink for engine metrics.
pub trait MetricsBackend: Send + Sync + fmt::Debug {
    /// Adds `value` to a counter.
    fn increment(&self, name: &str, value: u64, tags: &[(&str, &str)]);

    /// Records a duration observation.
    fn timing(&self, name: &str, duration: Duration, tags: &[(&str, &str)]);

    /// Sets a gauge.
    fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Backend forwarding to the `metrics` crate facade.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone)]
pub struct FacadeMetrics {
    prefix: String,
}

impl FacadeMetrics {
    /// Default metric name prefix.
    pub const DEFAULT_PREFIX: &'static str = "cadence_subscriptions_";

    /// Creates a backend with the default prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }

    /// Creates a backend with a custom prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the exported name for an engine metric.
    #[must_use]
    pub fn metric_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.replace('.', "_"))
    }
}

impl Default for FacadeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_labels(tags: &[(&str, &str)]) -> Vec<Label> {
    tags.iter()
        .map(|(key, value)| Label::new(key.to_string(), value.to_string()))
        .collect()
}

impl MetricsBackend for FacadeMetrics {
    fn increment(&self, name: &str, value: u64, tags: &[(&str, &str)]) {
        counter!(self.metric_name(name), to_labels(tags)).increment(value);
    }

    fn timing(&self, name: &str, duration: Duration, tags: &[(&str, &str)]) {
        histogram!(format!("{}_seconds", self.metric_name(name)), to_labels(tags))
            .record(duration.as_secs_f64());
    }

    fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        gauge!(self.metric_name(name), to_labels(tags)).set(value);
    }
}

/// RAII guard for timing operations.
///
/// Calls `on_drop` with the elapsed duration when dropped.
///
/// ## Example
///
/// ```rust
/// use cadence_subscriptions::metrics::{FacadeMetrics, MetricsBackend, TimingGuard, names};
///
/// let metrics = FacadeMetrics::new();
/// {
///     let _guard = TimingGuard::new(|duration| {
///         metrics.timing(names::SCHEDULER_FIND, duration, &[]);
///     });
///     // Expand the tick...
/// }
/// ```
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a guard that calls `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_names_are_prefixed_and_flattened() {
        let metrics = FacadeMetrics::new();
        assert_eq!(
            metrics.metric_name(names::SCHEDULER_CACHE_HIT),
            "cadence_subscriptions_scheduler_cache_hit"
        );
        assert_eq!(
            FacadeMetrics::with_prefix("x_").metric_name(names::CONSISTENT),
            "x_consistent"
        );
    }

    #[test]
    fn facade_records_without_recorder() {
        let metrics = FacadeMetrics::new();

        // No recorder is installed; these must not panic.
        metrics.increment(names::CONSISTENT, 1, &[]);
        metrics.timing(
            names::EXECUTION_DURATION,
            Duration::from_millis(3),
            &[(labels::SOURCE, "legacy")],
        );
        metrics.gauge("inflight", 2.0, &[(labels::PARTITION, "0")]);
    }

    #[test]
    fn timing_guard_measures_duration() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|d| recorded = Some(d));
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(recorded.is_some_and(|d| d >= Duration::from_millis(10)));
    }

    #[test]
    fn timing_guard_elapsed_works() {
        let guard = TimingGuard::new(|_| {});
        std::thread::sleep(Duration::from_millis(5));
        assert!(guard.elapsed() >= Duration::from_millis(5));
    }
}
