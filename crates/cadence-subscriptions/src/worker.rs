//! Tick processing and ordered result publication.
//!
//! The worker splits each tick into two phases:
//!
//! 1. [`SubscriptionWorker::process_message`] schedules the tick and spawns
//!    one execution per task. It returns immediately with the tasks and their
//!    pending results, in scheduling order.
//! 2. [`SubscriptionWorker::flush_batch`] awaits those results in the order
//!    they were returned and publishes one message per successful task.
//!
//! Executions run in parallel, bounded by a semaphore shared by every
//! partition the worker manages, and may finish in any order. Publication
//! order comes from walking the returned lists, never from completion order.
//!
//! ## Failure semantics
//!
//! - A failed query is isolated: it is reported in the [`FlushReport`] and
//!   its siblings still publish.
//! - A task that does not finish within the execution timeout, or whose
//!   execution panicked, fails the flush. The task is not cancelled.
//! - A publication failure fails the flush.
//! - A Delegate comparison runs as its own task once the authoritative result
//!   is ready. It holds its own permit, is bounded by the execution timeout
//!   and only feeds the comparison metric.
//!
//! A failed flush means the caller must not commit the tick's offset.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use cadence_core::observability::{evaluation_span, subscription_span};
use cadence_core::{PartitionId, SubscriptionIdentifier};

use crate::codec::{SubscriptionTaskResult, SubscriptionTaskResultCodec};
use crate::config::WorkerConfig;
use crate::data::{BuiltRequest, SubscriptionData};
use crate::error::{Error, Result};
use crate::executor::{ExecutionError, QueryExecutor};
use crate::metrics::{MetricsBackend, TimingGuard, labels, names};
use crate::producer::{ProducerRecord, ResultProducer};
use crate::request::Request;
use crate::sampling::Sampler;
use crate::scheduler::{ScheduledTask, SubscriptionScheduler};
use crate::tick::TickMessage;
use crate::value::{QueryValue, handle_nan};

/// Outcome of one execution: the request and its sanitized response.
pub type TaskOutcome = std::result::Result<(Request, QueryValue), ExecutionError>;

/// Tasks of one tick, each with its pending result.
pub type PendingTasks = Vec<(ScheduledTask, PendingResult)>;

/// Handle to a spawned execution.
///
/// Dropping the handle detaches the execution; it is never cancelled.
#[derive(Debug)]
pub struct PendingResult(JoinHandle<TaskOutcome>);

impl Future for PendingResult {
    type Output = std::result::Result<TaskOutcome, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

/// A task whose execution failed, as reported by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// The subscription evaluated.
    pub subscription: SubscriptionIdentifier,
    /// The evaluation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Why it failed.
    pub error: ExecutionError,
}

/// Summary of a completed flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of results published.
    pub published: usize,
    /// Tasks whose execution failed, in flush order.
    pub failed: Vec<TaskFailure>,
}

impl FlushReport {
    /// Returns true if every task published a result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything a spawned execution needs, shared across tasks.
struct Evaluator {
    executor: Arc<dyn QueryExecutor>,
    metrics: Arc<dyn MetricsBackend>,
    sampler: Arc<Sampler>,
    permits: Arc<Semaphore>,
    consistency_override: Option<bool>,
    comparison_timeout: Duration,
}

impl Evaluator {
    async fn evaluate(self: &Arc<Self>, task: &ScheduledTask) -> TaskOutcome {
        let data = &task.subscription.data;
        let BuiltRequest {
            mut request,
            comparison,
        } = data.build_request(task.timestamp, &self.sampler);

        if matches!(data, SubscriptionData::Delegate(_)) {
            self.metrics.increment(
                names::DELEGATE_ROUTED,
                1,
                &[(labels::SOURCE, request.source.as_label())],
            );
        }

        let consistent = self.sampler.consistent(self.consistency_override);
        request.settings.consistent = consistent;
        if consistent {
            self.metrics.increment(names::CONSISTENT, 1, &[]);
        }

        let response = match self.execute(&request).await {
            Ok(response) => response,
            Err(error) => {
                self.metrics.increment(
                    names::EXECUTION_FAILED,
                    1,
                    &[(labels::KIND, error.kind.as_label())],
                );
                tracing::warn!(%error, "subscription execution failed");
                return Err(error);
            }
        };

        if let Some(mut other) = comparison {
            other.settings.consistent = consistent;
            self.spawn_comparison(other, response.clone());
        }

        tracing::debug!(source = request.source.as_label(), consistent, "subscription evaluated");
        Ok((request, response))
    }

    async fn execute(&self, request: &Request) -> std::result::Result<QueryValue, ExecutionError> {
        let source = request.source.as_label();
        let _guard = TimingGuard::new(|duration| {
            self.metrics
                .timing(names::EXECUTION_DURATION, duration, &[(labels::SOURCE, source)]);
        });
        self.executor.execute(request).await.map(handle_nan)
    }

    /// Detaches the non-authoritative side of a Delegate.
    fn spawn_comparison(self: &Arc<Self>, other: Request, authoritative: QueryValue) {
        let evaluator = Arc::clone(self);
        tokio::spawn(
            async move {
                let Ok(_permit) = Arc::clone(&evaluator.permits).acquire_owned().await else {
                    return;
                };
                evaluator.compare(&other, &authoritative).await;
            }
            .in_current_span(),
        );
    }

    /// Runs the non-authoritative side of a Delegate and counts the outcome.
    async fn compare(&self, other: &Request, authoritative: &QueryValue) {
        let executed = tokio::time::timeout(self.comparison_timeout, self.execute(other)).await;
        let outcome = match executed {
            Err(_) => {
                tracing::debug!(
                    timeout = ?self.comparison_timeout,
                    "delegate comparison timed out"
                );
                "timeout"
            }
            Ok(Ok(response)) if &response == authoritative => "match",
            Ok(Ok(_)) => {
                tracing::warn!(
                    source = other.source.as_label(),
                    "delegate comparison mismatch"
                );
                "mismatch"
            }
            Ok(Err(error)) => {
                tracing::debug!(%error, "delegate comparison failed");
                "error"
            }
        };
        self.metrics
            .increment(names::DELEGATE_COMPARISON, 1, &[(labels::OUTCOME, outcome)]);
    }
}

/// Schedules, executes and publishes subscription evaluations.
pub struct SubscriptionWorker {
    schedulers: HashMap<PartitionId, SubscriptionScheduler>,
    producer: Arc<dyn ResultProducer>,
    evaluator: Arc<Evaluator>,
    config: WorkerConfig,
}

impl fmt::Debug for SubscriptionWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionWorker")
            .field("partitions", &self.partitions())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SubscriptionWorker {
    /// Creates a worker managing the partitions of `schedulers`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid or two schedulers
    /// own the same partition.
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        schedulers: impl IntoIterator<Item = SubscriptionScheduler>,
        producer: Arc<dyn ResultProducer>,
        metrics: Arc<dyn MetricsBackend>,
        sampler: Arc<Sampler>,
        config: WorkerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut by_partition = HashMap::new();
        for scheduler in schedulers {
            let partition = scheduler.partition();
            if by_partition.insert(partition, scheduler).is_some() {
                return Err(Error::configuration(format!(
                    "partition {partition} has more than one scheduler"
                )));
            }
        }

        Ok(Self {
            schedulers: by_partition,
            producer,
            evaluator: Arc::new(Evaluator {
                executor,
                metrics,
                sampler,
                permits: Arc::new(Semaphore::new(config.max_concurrency)),
                consistency_override: config.consistency_override,
                comparison_timeout: config.execution_timeout,
            }),
            config,
        })
    }

    /// Returns the managed partitions, ascending.
    #[must_use]
    pub fn partitions(&self) -> Vec<PartitionId> {
        let mut partitions: Vec<PartitionId> = self.schedulers.keys().copied().collect();
        partitions.sort_unstable();
        partitions
    }

    /// Returns the worker's configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Schedules `message`'s tick and starts executing its tasks.
    ///
    /// Returns `Ok(None)` if the message's partition is not managed by this
    /// worker. Otherwise returns the tasks in scheduling order, each paired
    /// with its pending result; executions proceed in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scheduling`] if the partition's store cannot be read.
    pub async fn process_message(&self, message: &TickMessage) -> Result<Option<PendingTasks>> {
        let Some(scheduler) = self.schedulers.get(&message.partition) else {
            tracing::debug!(partition = %message.partition, "tick for unmanaged partition skipped");
            return Ok(None);
        };

        let span = subscription_span("process_message", message.partition);
        async {
            let tasks = scheduler.find(&message.payload).await.inspect_err(|error| {
                tracing::error!(%error, offset = message.offset, "failed to schedule tick");
            })?;

            let pending: PendingTasks = tasks
                .into_iter()
                .map(|task| {
                    let result = self.submit(&task);
                    (task, result)
                })
                .collect();

            tracing::info!(
                offset = message.offset,
                tasks = pending.len(),
                "tick submitted"
            );
            Ok(Some(pending))
        }
        .instrument(span)
        .await
    }

    /// Waits for every pending result in order and publishes the successes.
    ///
    /// # Errors
    ///
    /// - [`Error::ExecutionTimeout`] if a task does not finish in time
    /// - [`Error::TaskAborted`] if a task's execution panicked
    /// - [`Error::Publication`] if a result cannot be delivered
    ///
    /// Results published before the error stay published.
    #[tracing::instrument(skip_all, fields(bundles = batch.len()))]
    pub async fn flush_batch(&self, batch: Vec<PendingTasks>) -> Result<FlushReport> {
        let mut report = FlushReport::default();

        for pending in batch {
            for (task, result) in pending {
                let outcome = match tokio::time::timeout(self.config.execution_timeout, result).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(join_error)) => {
                        tracing::error!(subscription = %task.identifier(), %join_error, "execution aborted");
                        return Err(Error::TaskAborted {
                            subscription: *task.identifier(),
                            timestamp: task.timestamp,
                            message: join_error.to_string(),
                        });
                    }
                    Err(_) => {
                        tracing::error!(
                            subscription = %task.identifier(),
                            timestamp = %task.timestamp,
                            "execution timed out"
                        );
                        return Err(Error::ExecutionTimeout {
                            subscription: *task.identifier(),
                            timestamp: task.timestamp,
                            timeout: self.config.execution_timeout,
                        });
                    }
                };

                match outcome {
                    Ok((request, response)) => {
                        self.publish(&SubscriptionTaskResult {
                            task,
                            request,
                            response,
                        })
                        .await?;
                        report.published += 1;
                    }
                    Err(error) => report.failed.push(TaskFailure {
                        subscription: *task.identifier(),
                        timestamp: task.timestamp,
                        error,
                    }),
                }
            }
        }

        tracing::info!(
            published = report.published,
            failed = report.failed.len(),
            "batch flushed"
        );
        Ok(report)
    }

    fn submit(&self, task: &ScheduledTask) -> PendingResult {
        let evaluator = Arc::clone(&self.evaluator);
        let permits = Arc::clone(&evaluator.permits);
        let span = evaluation_span(task.identifier(), &task.timestamp.to_rfc3339());
        let task = task.clone();

        PendingResult(tokio::spawn(
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| ExecutionError::unavailable("execution pool closed"))?;
                evaluator.evaluate(&task).await
            }
            .instrument(span),
        ))
    }

    async fn publish(&self, result: &SubscriptionTaskResult) -> Result<()> {
        let key = SubscriptionTaskResultCodec::key(result);
        let payload = SubscriptionTaskResultCodec::encode(result)?;
        let record = ProducerRecord::new(self.config.result_topic.clone(), key, payload);

        self.producer.produce(record).await.inspect_err(|error| {
            tracing::error!(%error, subscription = %result.task.identifier(), "failed to publish result");
        })?;

        let partition = key.to_string();
        self.evaluator.metrics.increment(
            names::RESULTS_PUBLISHED,
            1,
            &[(labels::PARTITION, partition.as_str())],
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StructuredSubscriptionData;
    use crate::executor::{FailingExecutor, StaticExecutor};
    use crate::metrics::RecordingMetrics;
    use crate::producer::InMemoryBroker;
    use crate::store::SubscriptionDataStore;
    use crate::store::memory::InMemorySubscriptionStore;
    use crate::tick::Tick;
    use cadence_core::{InMemoryRuntimeConfig, Interval};
    use chrono::{Duration, TimeZone};
    use std::time::Duration as StdDuration;
    use uuid::Uuid;

    fn at(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, m, 0).unwrap()
    }

    fn message(partition: u16, lower: u32, upper: u32) -> TickMessage {
        TickMessage::new(
            PartitionId::new(partition),
            0,
            Tick::new(
                Interval::new(0, 1).unwrap(),
                Interval::new(at(lower), at(upper)).unwrap(),
            ),
            at(upper),
        )
    }

    async fn worker(
        executor: Arc<dyn QueryExecutor>,
    ) -> (SubscriptionWorker, Arc<InMemoryBroker>, Arc<RecordingMetrics>) {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store
            .create(
                Uuid::new_v4(),
                StructuredSubscriptionData::new(1, "MATCH (e) SELECT count()", Duration::hours(1), Duration::minutes(1))
                    .unwrap()
                    .into(),
            )
            .await
            .unwrap();

        let metrics = Arc::new(RecordingMetrics::new());
        let broker = Arc::new(InMemoryBroker::new());
        broker.create_topic(crate::config::DEFAULT_RESULT_TOPIC, 1).unwrap();
        let config = Arc::new(InMemoryRuntimeConfig::new());

        let worker = SubscriptionWorker::new(
            executor,
            [SubscriptionScheduler::new(
                store,
                PartitionId::new(0),
                StdDuration::ZERO,
                metrics.clone(),
            )],
            broker.clone(),
            metrics.clone(),
            Arc::new(Sampler::with_seed(config, 1)),
            WorkerConfig::default(),
        )
        .unwrap();
        (worker, broker, metrics)
    }

    #[tokio::test]
    async fn unmanaged_partition_is_skipped() {
        let (worker, _, _) = worker(Arc::new(StaticExecutor::default())).await;
        assert!(worker.process_message(&message(9, 0, 3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publishes_one_result_per_task() {
        let (worker, broker, metrics) = worker(Arc::new(StaticExecutor::new(QueryValue::UInt(1)))).await;

        let pending = worker.process_message(&message(0, 0, 3)).await.unwrap().unwrap();
        assert_eq!(pending.len(), 3);

        let report = worker.flush_batch(vec![pending]).await.unwrap();
        assert_eq!(report.published, 3);
        assert!(report.is_complete());
        assert_eq!(broker.all_messages(crate::config::DEFAULT_RESULT_TOPIC).unwrap().len(), 3);
        assert_eq!(metrics.count(names::RESULTS_PUBLISHED), 3);
        assert_eq!(metrics.count(names::CONSISTENT), 3);
    }

    #[tokio::test]
    async fn execution_failures_are_reported_not_fatal() {
        let executor = FailingExecutor::new(ExecutionError::query("syntax error"));
        let (worker, broker, metrics) = worker(Arc::new(executor)).await;

        let pending = worker.process_message(&message(0, 0, 2)).await.unwrap().unwrap();
        let report = worker.flush_batch(vec![pending]).await.unwrap();

        assert_eq!(report.published, 0);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].timestamp, at(1));
        assert!(broker.all_messages(crate::config::DEFAULT_RESULT_TOPIC).unwrap().is_empty());
        assert_eq!(metrics.count_tagged(names::EXECUTION_FAILED, labels::KIND, "query"), 2);
    }

    #[tokio::test]
    async fn duplicate_partition_is_rejected() {
        let store: Arc<dyn SubscriptionDataStore> = Arc::new(InMemorySubscriptionStore::new());
        let metrics: Arc<dyn MetricsBackend> = Arc::new(RecordingMetrics::new());
        let schedulers = (0..2).map(|_| {
            SubscriptionScheduler::new(Arc::clone(&store), PartitionId::new(0), StdDuration::ZERO, Arc::clone(&metrics))
        });

        let result = SubscriptionWorker::new(
            Arc::new(StaticExecutor::default()),
            schedulers,
            Arc::new(InMemoryBroker::new()),
            Arc::clone(&metrics),
            Arc::new(Sampler::new(Arc::new(InMemoryRuntimeConfig::new()))),
            WorkerConfig::default(),
        );
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
