//! Observability infrastructure for cadence.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors shared by every
//! consumer role that embeds the subscription engine.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::id::{PartitionId, SubscriptionIdentifier};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `cadence_subscriptions=debug`)
///
/// # Example
///
/// ```rust
/// use cadence_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // A subscriber installed elsewhere (e.g. by an embedding binary) wins.
        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
    });
}

/// Creates a span for partition-scoped subscription work (scheduling, flushing).
///
/// # Example
///
/// ```rust
/// use cadence_core::id::PartitionId;
/// use cadence_core::observability::subscription_span;
///
/// let span = subscription_span("process_message", PartitionId::new(0));
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn subscription_span(operation: &str, partition: PartitionId) -> Span {
    tracing::info_span!(
        "subscriptions",
        op = operation,
        partition = partition.index(),
    )
}

/// Creates a span for a single subscription evaluation.
#[must_use]
pub fn evaluation_span(subscription: &SubscriptionIdentifier, timestamp: &str) -> Span {
    tracing::debug_span!(
        "evaluation",
        subscription = %subscription,
        timestamp = timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        // Should not panic (uses Once internally)
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json); // Second call should be no-op
    }

    #[test]
    fn test_subscription_span_creates_span() {
        let span = subscription_span("flush_batch", PartitionId::new(2));
        let _guard = span.enter();
        tracing::info!("flushing");
    }

    #[test]
    fn test_evaluation_span_creates_span() {
        let id = SubscriptionIdentifier::generate(PartitionId::new(0));
        let span = evaluation_span(&id, "2000-01-01T00:00:00Z");
        let _guard = span.enter();
        tracing::debug!("evaluating");
    }
}
