//! # cadence-subscriptions
//!
//! Tick-driven scheduling and execution of subscription queries.
//!
//! A commit-log consumer hands the engine one [`tick::Tick`] per advance of a
//! partition. The engine turns each tick into the exact set of evaluations
//! that became due, runs them concurrently, and publishes their results in
//! scheduling order:
//!
//! - **Scheduling**: [`scheduler::SubscriptionScheduler`] expands a tick into
//!   ordered tasks, one per resolution-aligned timestamp
//! - **Execution**: [`worker::SubscriptionWorker`] runs tasks on a bounded pool
//! - **Publication**: results are sanitized ([`value::handle_nan`]), encoded
//!   ([`codec`]) and produced to a broker topic in order
//!
//! ## Guarantees
//!
//! - **No gaps, no duplicates**: contiguous ticks evaluate every aligned
//!   timestamp exactly once
//! - **Ordered**: results for a partition publish in scheduling order
//! - **At-least-once**: a tick whose flush fails must be re-driven by the caller
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cadence_core::{InMemoryRuntimeConfig, PartitionId};
//! use cadence_subscriptions::prelude::*;
//!
//! # async fn run(message: TickMessage) -> Result<()> {
//! let store = Arc::new(InMemorySubscriptionStore::new());
//! let broker = Arc::new(InMemoryBroker::new());
//! let metrics = Arc::new(FacadeMetrics::new());
//! let config = WorkerConfig::from_env()?;
//! broker.create_topic(config.result_topic.clone(), 1)?;
//!
//! let scheduler = SubscriptionScheduler::new(
//!     store,
//!     PartitionId::new(0),
//!     config.scheduler_cache_ttl,
//!     metrics.clone(),
//! );
//! let worker = SubscriptionWorker::new(
//!     Arc::new(StaticExecutor::default()),
//!     [scheduler],
//!     broker,
//!     metrics,
//!     Arc::new(Sampler::new(Arc::new(InMemoryRuntimeConfig::new()))),
//!     config,
//! )?;
//!
//! if let Some(pending) = worker.process_message(&message).await? {
//!     let report = worker.flush_batch(vec![pending]).await?;
//!     assert!(report.is_complete());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod config;
pub mod data;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod producer;
pub mod request;
pub mod sampling;
pub mod scheduler;
pub mod store;
pub mod tick;
pub mod value;
pub mod worker;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{PublishedResult, SubscriptionTaskResult, SubscriptionTaskResultCodec};
    pub use crate::config::WorkerConfig;
    pub use crate::data::{
        DelegateSubscriptionData, LegacySubscriptionData, StructuredSubscriptionData,
        Subscription, SubscriptionData,
    };
    pub use crate::error::{Error, Result};
    pub use crate::executor::{ExecutionError, ExecutionErrorKind, QueryExecutor, StaticExecutor};
    pub use crate::metrics::{FacadeMetrics, MetricsBackend, RecordingMetrics};
    pub use crate::producer::{InMemoryBroker, ProducerRecord, ResultProducer};
    pub use crate::request::{QuerySource, Request};
    pub use crate::sampling::Sampler;
    pub use crate::scheduler::{ScheduledTask, SubscriptionScheduler};
    pub use crate::store::SubscriptionDataStore;
    pub use crate::store::memory::InMemorySubscriptionStore;
    pub use crate::tick::{Tick, TickMessage};
    pub use crate::value::{QueryValue, handle_nan};
    pub use crate::worker::{FlushReport, PendingTasks, SubscriptionWorker, TaskFailure};
}

pub use error::{Error, Result};
