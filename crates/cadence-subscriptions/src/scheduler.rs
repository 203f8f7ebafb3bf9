//! Tick expansion into due evaluations.
//!
//! A [`SubscriptionScheduler`] owns one partition. For every tick it reads a
//! snapshot of that partition's store and emits one [`ScheduledTask`] per
//! (subscription, aligned timestamp) pair falling in the tick:
//!
//! - **Ordering**: subscriptions in store-enumeration order, then timestamps ascending
//! - **Exactly once**: contiguous ticks never share or skip an aligned timestamp
//! - **All or nothing**: a store failure or an invalid stored definition
//!   fails the whole tick
//!
//! The snapshot may be cached for a configurable TTL. With a zero TTL (the
//! default) every tick sees the store as it is when the tick is scheduled.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use cadence_core::{PartitionId, SubscriptionIdentifier};

use crate::data::Subscription;
use crate::error::Result;
use crate::metrics::{MetricsBackend, TimingGuard, labels, names};
use crate::store::SubscriptionDataStore;
use crate::tick::{Tick, aligned_timestamps};

/// One due evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    /// The subscription to evaluate.
    pub subscription: Arc<Subscription>,
    /// The logical time the evaluation is for.
    pub timestamp: DateTime<Utc>,
}

impl ScheduledTask {
    /// Creates a task.
    #[must_use]
    pub const fn new(subscription: Arc<Subscription>, timestamp: DateTime<Utc>) -> Self {
        Self {
            subscription,
            timestamp,
        }
    }

    /// Returns the identifier of the subscription being evaluated.
    #[must_use]
    pub fn identifier(&self) -> &SubscriptionIdentifier {
        &self.subscription.identifier
    }
}

#[derive(Debug)]
struct Snapshot {
    subscriptions: Arc<Vec<Arc<Subscription>>>,
    fetched_at: Instant,
}

/// Expands ticks of one partition into ordered tasks.
pub struct SubscriptionScheduler {
    store: Arc<dyn SubscriptionDataStore>,
    partition: PartitionId,
    cache_ttl: Duration,
    cache: Mutex<Option<Snapshot>>,
    metrics: Arc<dyn MetricsBackend>,
}

impl fmt::Debug for SubscriptionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionScheduler")
            .field("partition", &self.partition)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl SubscriptionScheduler {
    /// Creates a scheduler for `partition` reading from `store`.
    ///
    /// A zero `cache_ttl` disables snapshot caching.
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriptionDataStore>,
        partition: PartitionId,
        cache_ttl: Duration,
        metrics: Arc<dyn MetricsBackend>,
    ) -> Self {
        Self {
            store,
            partition,
            cache_ttl,
            cache: Mutex::new(None),
            metrics,
        }
    }

    /// Returns the partition this scheduler owns.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Returns the tasks due in `tick`, in scheduling order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Scheduling`] if the store cannot be read or
    /// returns a definition that fails validation. No tasks are produced for
    /// the tick in that case.
    #[tracing::instrument(
        skip(self, tick),
        fields(
            partition = %self.partition,
            lower = %tick.timestamps.lower(),
            upper = %tick.timestamps.upper(),
        )
    )]
    pub async fn find(&self, tick: &Tick) -> Result<Vec<ScheduledTask>> {
        let partition = self.partition.to_string();
        let tags = [(labels::PARTITION, partition.as_str())];
        let _guard = TimingGuard::new(|duration| {
            self.metrics.timing(names::SCHEDULER_FIND, duration, &tags);
        });

        let subscriptions = self
            .snapshot(&tags)
            .await
            .map_err(|e| e.scheduling(self.partition))?;

        let mut tasks = Vec::new();
        for subscription in subscriptions.iter() {
            for timestamp in aligned_timestamps(&tick.timestamps, subscription.data.resolution()) {
                tasks.push(ScheduledTask::new(Arc::clone(subscription), timestamp));
            }
        }

        self.metrics
            .increment(names::SCHEDULER_TASKS, tasks.len() as u64, &tags);
        tracing::debug!(
            subscriptions = subscriptions.len(),
            tasks = tasks.len(),
            "tick scheduled"
        );
        Ok(tasks)
    }

    async fn snapshot(&self, tags: &[(&str, &str)]) -> Result<Arc<Vec<Arc<Subscription>>>> {
        let caching = !self.cache_ttl.is_zero();

        if caching {
            let cached = self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .filter(|snapshot| snapshot.fetched_at.elapsed() < self.cache_ttl)
                .map(|snapshot| Arc::clone(&snapshot.subscriptions));
            if let Some(subscriptions) = cached {
                self.metrics.increment(names::SCHEDULER_CACHE_HIT, 1, tags);
                return Ok(subscriptions);
            }
            self.metrics.increment(names::SCHEDULER_CACHE_MISS, 1, tags);
        }

        let mut entries = Vec::new();
        for (uuid, data) in self.store.all().await? {
            data.validate().inspect_err(|error| {
                tracing::error!(%uuid, %error, "corrupt subscription in snapshot");
            })?;
            entries.push(Arc::new(Subscription::new(
                SubscriptionIdentifier::new(self.partition, uuid),
                data,
            )));
        }
        let subscriptions = Arc::new(entries);

        if caching {
            *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(Snapshot {
                subscriptions: Arc::clone(&subscriptions),
                fetched_at: Instant::now(),
            });
        }
        Ok(subscriptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{StructuredSubscriptionData, SubscriptionData};
    use crate::error::Error;
    use crate::metrics::RecordingMetrics;
    use crate::store::memory::InMemorySubscriptionStore;
    use cadence_core::Interval;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, m, s).unwrap()
    }

    fn tick(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Tick {
        Tick::new(Interval::new(0, 1).unwrap(), Interval::new(lower, upper).unwrap())
    }

    fn data(resolution: chrono::Duration) -> SubscriptionData {
        StructuredSubscriptionData::new(1, "MATCH (e) SELECT count()", chrono::Duration::hours(1), resolution)
            .unwrap()
            .into()
    }

    fn scheduler(
        store: Arc<InMemorySubscriptionStore>,
        ttl: Duration,
    ) -> (SubscriptionScheduler, Arc<RecordingMetrics>) {
        let metrics = Arc::new(RecordingMetrics::new());
        let scheduler = SubscriptionScheduler::new(store, PartitionId::new(2), ttl, metrics.clone());
        (scheduler, metrics)
    }

    #[tokio::test]
    async fn orders_by_store_then_timestamp() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.create(first, data(chrono::Duration::minutes(1))).await.unwrap();
        store.create(second, data(chrono::Duration::minutes(1))).await.unwrap();

        let (scheduler, metrics) = scheduler(store, Duration::ZERO);
        let tasks = scheduler.find(&tick(at(0, 0), at(2, 0))).await.unwrap();

        let observed: Vec<(Uuid, DateTime<Utc>)> = tasks
            .iter()
            .map(|t| (t.identifier().uuid(), t.timestamp))
            .collect();
        assert_eq!(
            observed,
            vec![
                (first, at(1, 0)),
                (first, at(2, 0)),
                (second, at(1, 0)),
                (second, at(2, 0)),
            ]
        );
        assert!(tasks.iter().all(|t| t.identifier().partition() == PartitionId::new(2)));
        assert_eq!(metrics.count(names::SCHEDULER_TASKS), 4);
        assert_eq!(metrics.timings(names::SCHEDULER_FIND).len(), 1);
    }

    #[tokio::test]
    async fn zero_resolution_schedules_once_per_tick() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store.create(Uuid::new_v4(), data(chrono::Duration::zero())).await.unwrap();

        let (scheduler, _) = scheduler(store, Duration::ZERO);
        let tasks = scheduler.find(&tick(at(0, 0), at(0, 7))).await.unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].timestamp, at(0, 7));
    }

    #[tokio::test]
    async fn store_failure_is_a_scheduling_error() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store.create(Uuid::new_v4(), data(chrono::Duration::minutes(1))).await.unwrap();
        store.set_available(false);

        let (scheduler, _) = scheduler(store, Duration::ZERO);
        let result = scheduler.find(&tick(at(0, 0), at(3, 0))).await;

        match result {
            Err(Error::Scheduling { partition, .. }) => assert_eq!(partition, PartitionId::new(2)),
            other => panic!("expected scheduling error, got {other:?}"),
        }
    }

    /// Store handing back whatever it holds, without validating it.
    struct RawStore(Vec<(Uuid, SubscriptionData)>);

    #[async_trait::async_trait]
    impl SubscriptionDataStore for RawStore {
        async fn create(&self, _key: Uuid, _data: SubscriptionData) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _key: &Uuid) -> Result<()> {
            Ok(())
        }

        async fn all(&self) -> Result<Vec<(Uuid, SubscriptionData)>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn invalid_stored_definition_is_a_scheduling_error() {
        let corrupt = StructuredSubscriptionData {
            project_id: 1,
            query: String::new(),
            time_window: chrono::Duration::hours(1),
            resolution: chrono::Duration::milliseconds(500),
        };
        let store = RawStore(vec![
            (Uuid::new_v4(), data(chrono::Duration::minutes(1))),
            (Uuid::new_v4(), corrupt.into()),
        ]);
        let metrics = Arc::new(RecordingMetrics::new());
        let scheduler =
            SubscriptionScheduler::new(Arc::new(store), PartitionId::new(2), Duration::ZERO, metrics.clone());

        let result = scheduler.find(&tick(at(0, 0), at(1, 0))).await;

        match result {
            Err(Error::Scheduling { partition, source }) => {
                assert_eq!(partition, PartitionId::new(2));
                assert!(matches!(*source, Error::InvalidSubscription { .. }));
            }
            other => panic!("expected scheduling error, got {other:?}"),
        }
        assert_eq!(metrics.count(names::SCHEDULER_TASKS), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_serves_snapshot_until_ttl_expires() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let key = Uuid::new_v4();
        store.create(key, data(chrono::Duration::minutes(1))).await.unwrap();

        let (scheduler, metrics) = scheduler(Arc::clone(&store), Duration::from_secs(30));
        assert_eq!(scheduler.find(&tick(at(0, 0), at(1, 0))).await.unwrap().len(), 1);

        store.delete(&key).await.unwrap();
        assert_eq!(scheduler.find(&tick(at(1, 0), at(2, 0))).await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(scheduler.find(&tick(at(2, 0), at(3, 0))).await.unwrap().is_empty());

        assert_eq!(metrics.count(names::SCHEDULER_CACHE_MISS), 2);
        assert_eq!(metrics.count(names::SCHEDULER_CACHE_HIT), 1);
    }
}
