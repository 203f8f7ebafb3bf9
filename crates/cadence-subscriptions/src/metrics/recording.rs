//! In-memory metrics backend for tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::MetricsBackend;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricCall {
    /// Counter increment.
    Increment {
        /// Metric name.
        name: String,
        /// Amount added.
        value: u64,
        /// Tags, in call order.
        tags: Vec<(String, String)>,
    },
    /// Duration observation.
    Timing {
        /// Metric name.
        name: String,
        /// Observed duration.
        duration: Duration,
        /// Tags, in call order.
        tags: Vec<(String, String)>,
    },
    /// Gauge update.
    Gauge {
        /// Metric name.
        name: String,
        /// New value.
        value: f64,
        /// Tags, in call order.
        tags: Vec<(String, String)>,
    },
}

impl MetricCall {
    /// Returns the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Increment { name, .. } | Self::Timing { name, .. } | Self::Gauge { name, .. } => {
                name
            }
        }
    }

    /// Returns the call's tags.
    #[must_use]
    pub fn tags(&self) -> &[(String, String)] {
        match self {
            Self::Increment { tags, .. } | Self::Timing { tags, .. } | Self::Gauge { tags, .. } => {
                tags
            }
        }
    }

    fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags().iter().any(|(k, v)| k == key && v == value)
    }
}

/// Backend that records every call in memory.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    calls: Mutex<Vec<MetricCall>>,
}

impl RecordingMetrics {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<MetricCall> {
        self.lock().clone()
    }

    /// Returns the summed increments recorded for `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> u64 {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                MetricCall::Increment { name: n, value, .. } if n == name => Some(*value),
                _ => None,
            })
            .sum()
    }

    /// Returns the summed increments for `name` carrying tag `key=value`.
    #[must_use]
    pub fn count_tagged(&self, name: &str, key: &str, value: &str) -> u64 {
        self.lock()
            .iter()
            .filter(|call| call.has_tag(key, value))
            .filter_map(|call| match call {
                MetricCall::Increment { name: n, value, .. } if n == name => Some(*value),
                _ => None,
            })
            .sum()
    }

    /// Returns the durations recorded for `name`.
    #[must_use]
    pub fn timings(&self, name: &str) -> Vec<Duration> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                MetricCall::Timing { name: n, duration, .. } if n == name => Some(*duration),
                _ => None,
            })
            .collect()
    }

    /// Clears all recorded calls.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, call: MetricCall) {
        self.lock().push(call);
    }
}

fn owned_tags(tags: &[(&str, &str)]) -> Vec<(String, String)> {
    tags.iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

impl MetricsBackend for RecordingMetrics {
    fn increment(&self, name: &str, value: u64, tags: &[(&str, &str)]) {
        self.push(MetricCall::Increment {
            name: name.to_string(),
            value,
            tags: owned_tags(tags),
        });
    }

    fn timing(&self, name: &str, duration: Duration, tags: &[(&str, &str)]) {
        self.push(MetricCall::Timing {
            name: name.to_string(),
            duration,
            tags: owned_tags(tags),
        });
    }

    fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.push(MetricCall::Gauge {
            name: name.to_string(),
            value,
            tags: owned_tags(tags),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{labels, names};

    #[test]
    fn counts_sum_per_name() {
        let metrics = RecordingMetrics::new();
        metrics.increment(names::CONSISTENT, 1, &[]);
        metrics.increment(names::CONSISTENT, 1, &[]);
        metrics.increment(names::RESULTS_PUBLISHED, 3, &[(labels::PARTITION, "0")]);

        assert_eq!(metrics.count(names::CONSISTENT), 2);
        assert_eq!(metrics.count(names::RESULTS_PUBLISHED), 3);
        assert_eq!(metrics.count(names::EXECUTION_FAILED), 0);
    }

    #[test]
    fn tagged_counts_filter_by_tag() {
        let metrics = RecordingMetrics::new();
        metrics.increment(names::DELEGATE_ROUTED, 1, &[(labels::SOURCE, "legacy")]);
        metrics.increment(names::DELEGATE_ROUTED, 1, &[(labels::SOURCE, "structured")]);
        metrics.increment(names::DELEGATE_ROUTED, 1, &[(labels::SOURCE, "legacy")]);

        assert_eq!(
            metrics.count_tagged(names::DELEGATE_ROUTED, labels::SOURCE, "legacy"),
            2
        );
    }

    #[test]
    fn timings_and_reset() {
        let metrics = RecordingMetrics::new();
        metrics.timing(names::SCHEDULER_FIND, Duration::from_millis(2), &[]);
        assert_eq!(metrics.timings(names::SCHEDULER_FIND).len(), 1);
        assert_eq!(metrics.calls()[0].name(), names::SCHEDULER_FIND);

        metrics.reset();
        assert!(metrics.calls().is_empty());
    }
}
