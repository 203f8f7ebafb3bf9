//! Custom assertion helpers for published results.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use cadence_core::SubscriptionIdentifier;
use cadence_subscriptions::codec::PublishedResult;
use cadence_subscriptions::value::QueryValue;

/// Asserts each subscription's results are in strictly ascending evaluation order.
pub fn assert_ascending_timestamps(results: &[PublishedResult]) {
    let mut latest: HashMap<SubscriptionIdentifier, DateTime<Utc>> = HashMap::new();
    for result in results {
        if let Some(previous) = latest.insert(result.subscription_identifier, result.evaluation_timestamp) {
            assert!(
                previous < result.evaluation_timestamp,
                "{}: result for {} published after {}",
                result.subscription_identifier,
                result.evaluation_timestamp,
                previous,
            );
        }
    }
}

/// Asserts results carry exactly `expected` evaluation timestamps, in order.
pub fn assert_timestamps(results: &[PublishedResult], expected: &[DateTime<Utc>]) {
    let actual: Vec<DateTime<Utc>> = results.iter().map(|r| r.evaluation_timestamp).collect();
    assert_eq!(actual, expected, "unexpected evaluation timestamps");
}

/// Asserts every request is bounded by `[evaluation_timestamp - window, evaluation_timestamp)`.
pub fn assert_time_windows(results: &[PublishedResult], window: Duration) {
    for result in results {
        assert!(
            result
                .request_summary
                .has_time_window(result.evaluation_timestamp, window),
            "request for {} lacks its {}s time window: {:?}",
            result.evaluation_timestamp,
            window.num_seconds(),
            result.request_summary.conditions,
        );
    }
}

/// Asserts the response was produced by the side recorded in the request summary.
pub fn assert_single_source(result: &PublishedResult) {
    let expected = QueryValue::from(result.request_summary.source.as_label());
    assert_eq!(
        result.response.get("source"),
        Some(&expected),
        "response source does not match request source"
    );
}
