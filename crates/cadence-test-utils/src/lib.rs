//! Shared test utilities for cadence integration tests.
//!
//! This crate provides:
//! - [`SubscriptionFactory`] and [`TickFactory`]: Factory functions for test data
//! - [`TestContext`]: Pre-wired store, broker, metrics and runtime configuration
//! - [`ScriptedExecutor`]: Query executor with per-timestamp delays and failures
//! - [`SimulatedExecutor`]: Seeded executor with random latency and failures
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence_test_utils::{SubscriptionFactory, TestContext, TickFactory};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new();
//!     ctx.add(SubscriptionFactory::structured()).await;
//!     // ... build a worker and process ticks ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod executors;
pub mod fixtures;

pub use assertions::*;
pub use executors::*;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cadence_subscriptions=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
