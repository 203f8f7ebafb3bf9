//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create test data with sensible defaults.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use cadence_core::{InMemoryRuntimeConfig, Interval, PartitionId};
use cadence_subscriptions::codec::{PublishedResult, SubscriptionTaskResultCodec};
use cadence_subscriptions::config::WorkerConfig;
use cadence_subscriptions::data::{
    DelegateSubscriptionData, LegacySubscriptionData, StructuredSubscriptionData, SubscriptionData,
};
use cadence_subscriptions::executor::QueryExecutor;
use cadence_subscriptions::metrics::RecordingMetrics;
use cadence_subscriptions::producer::InMemoryBroker;
use cadence_subscriptions::request::Aggregation;
use cadence_subscriptions::sampling::{Sampler, keys};
use cadence_subscriptions::scheduler::SubscriptionScheduler;
use cadence_subscriptions::store::SubscriptionDataStore;
use cadence_subscriptions::store::memory::InMemorySubscriptionStore;
use cadence_subscriptions::tick::{Tick, TickMessage};
use cadence_subscriptions::worker::SubscriptionWorker;

/// Project every fixture subscription belongs to.
pub const PROJECT_ID: u64 = 1;
/// Structured query used by fixtures.
pub const STRUCTURED_QUERY: &str = "MATCH (events) SELECT count() AS count";

/// Factory for subscription definitions with a 60 minute window.
pub struct SubscriptionFactory;

impl SubscriptionFactory {
    /// Legacy `count()` subscription evaluated every minute.
    pub fn legacy() -> SubscriptionData {
        Self::legacy_data(Duration::minutes(1)).into()
    }

    /// Structured `count()` subscription evaluated every minute.
    pub fn structured() -> SubscriptionData {
        Self::structured_data(Duration::minutes(1)).into()
    }

    /// Delegate pairing the legacy and structured fixtures.
    pub fn delegate() -> SubscriptionData {
        DelegateSubscriptionData::new(
            Self::legacy_data(Duration::minutes(1)),
            Self::structured_data(Duration::minutes(1)),
        )
        .expect("fixture delegate is valid")
        .into()
    }

    /// One subscription of every variant.
    pub fn all_variants() -> Vec<SubscriptionData> {
        vec![Self::legacy(), Self::structured(), Self::delegate()]
    }

    /// Structured subscription with a custom resolution.
    pub fn with_resolution(resolution: Duration) -> SubscriptionData {
        Self::structured_data(resolution).into()
    }

    fn legacy_data(resolution: Duration) -> LegacySubscriptionData {
        LegacySubscriptionData::new(
            PROJECT_ID,
            vec![],
            vec![Aggregation::new("count()", "", "count")],
            Duration::minutes(60),
            resolution,
        )
        .expect("fixture legacy subscription is valid")
    }

    fn structured_data(resolution: Duration) -> StructuredSubscriptionData {
        StructuredSubscriptionData::new(PROJECT_ID, STRUCTURED_QUERY, Duration::minutes(60), resolution)
            .expect("fixture structured subscription is valid")
    }
}

/// Factory for ticks and tick messages.
pub struct TickFactory;

impl TickFactory {
    /// Returns `2000-01-01T00:00:00Z` plus `seconds`.
    pub fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    /// Tick covering `(lower, upper]`.
    pub fn tick(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Tick {
        Tick::new(
            Interval::new(0, 1).unwrap(),
            Interval::new(lower, upper).expect("tick bounds are ordered"),
        )
    }

    /// Contiguous ticks starting at `start`, one per span in `durations`.
    pub fn contiguous(start: DateTime<Utc>, durations: &[Duration]) -> Vec<Tick> {
        let mut lower = start;
        let mut offset = 0_u64;
        durations
            .iter()
            .map(|duration| {
                let upper = lower + *duration;
                let tick = Tick::new(
                    Interval::new(offset, offset + 1).unwrap(),
                    Interval::new(lower, upper).expect("durations are non-negative"),
                );
                lower = upper;
                offset += 1;
                tick
            })
            .collect()
    }

    /// Message delivering `tick` for `partition`.
    pub fn message(partition: PartitionId, tick: Tick) -> TickMessage {
        TickMessage::new(partition, *tick.offsets.upper(), tick, *tick.timestamps.upper())
    }
}

/// Test context with a store, broker, metrics and runtime configuration.
pub struct TestContext {
    /// Partition the context's store backs.
    pub partition: PartitionId,
    /// Subscription store.
    pub store: Arc<InMemorySubscriptionStore>,
    /// Result broker; the result topic is created with one partition.
    pub broker: Arc<InMemoryBroker>,
    /// Recorded metrics.
    pub metrics: Arc<RecordingMetrics>,
    /// Runtime configuration, with every rate pinned to a deterministic value.
    pub runtime_config: Arc<InMemoryRuntimeConfig>,
    /// Worker settings used by [`Self::worker`].
    pub config: WorkerConfig,
}

impl TestContext {
    /// Creates a context for partition 0.
    ///
    /// Consistency is pinned to 1.0, rollout and comparison to 0.0.
    pub fn new() -> Self {
        Self::with_config(WorkerConfig::default())
    }

    /// Creates a context with custom worker settings.
    pub fn with_config(config: WorkerConfig) -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        broker
            .create_topic(config.result_topic.clone(), 1)
            .expect("topic is valid");

        Self {
            partition: PartitionId::new(0),
            store: Arc::new(InMemorySubscriptionStore::new()),
            broker,
            metrics: Arc::new(RecordingMetrics::new()),
            runtime_config: Arc::new(InMemoryRuntimeConfig::with_values([
                (keys::CONSISTENT_SAMPLE_RATE, 1.0),
                (keys::ROLLOUT_PCT, 0.0),
                (keys::DELEGATE_COMPARISON_PCT, 0.0),
            ])),
            config,
        }
    }

    /// Stores `data` under a fresh key and returns the key.
    pub async fn add(&self, data: SubscriptionData) -> Uuid {
        let key = Uuid::new_v4();
        self.store.create(key, data).await.expect("fixture data is valid");
        key
    }

    /// Builds a scheduler for the context's partition.
    pub fn scheduler(&self) -> SubscriptionScheduler {
        SubscriptionScheduler::new(
            self.store.clone(),
            self.partition,
            StdDuration::ZERO,
            self.metrics.clone(),
        )
    }

    /// Builds a worker for the context's partition around `executor`.
    pub fn worker(&self, executor: Arc<dyn QueryExecutor>) -> SubscriptionWorker {
        SubscriptionWorker::new(
            executor,
            [self.scheduler()],
            self.broker.clone(),
            self.metrics.clone(),
            Arc::new(Sampler::with_seed(self.runtime_config.clone(), 17)),
            self.config.clone(),
        )
        .expect("test worker config is valid")
    }

    /// Message for a tick on the context's partition.
    pub fn message(&self, lower: DateTime<Utc>, upper: DateTime<Utc>) -> TickMessage {
        TickFactory::message(self.partition, TickFactory::tick(lower, upper))
    }

    /// Decodes every result published on the result topic, in order.
    pub fn published(&self) -> Vec<PublishedResult> {
        self.broker
            .all_messages(&self.config.result_topic)
            .expect("result topic exists")
            .iter()
            .map(|message| SubscriptionTaskResultCodec::decode(&message.payload).expect("valid result"))
            .collect()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
