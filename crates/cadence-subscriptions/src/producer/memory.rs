//! In-memory broker for testing.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No persistence, no replication
//! - **Single-process only**: Messages are not visible across process boundaries

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use cadence_core::PartitionId;

use super::{ProduceAck, ProducerRecord, ResultProducer};
use crate::error::{Error, Result};

/// A record as stored on a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Offset within the partition.
    pub offset: u64,
    /// Key the record was produced with.
    pub key: PartitionId,
    /// Payload bytes.
    pub payload: Bytes,
}

/// In-memory broker with named, partitioned topics.
///
/// A record lands on partition `key % partitions` of its topic.
///
/// ## Example
///
/// ```rust
/// use cadence_subscriptions::producer::InMemoryBroker;
///
/// let broker = InMemoryBroker::new();
/// broker.create_topic("subscription-results", 4).unwrap();
/// ```
#[derive(Debug)]
pub struct InMemoryBroker {
    topics: RwLock<HashMap<String, Vec<Vec<StoredMessage>>>>,
    available: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a lock poison error to a publication error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::publication("broker lock poisoned")
}

impl InMemoryBroker {
    /// Creates a broker with no topics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Creates `topic` with `partitions` partitions. Existing topics are kept.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `partitions` is zero.
    pub fn create_topic(&self, topic: impl Into<String>, partitions: u32) -> Result<()> {
        if partitions == 0 {
            return Err(Error::configuration("topic needs at least one partition"));
        }
        let mut topics = self.topics.write().map_err(poison_err)?;
        topics
            .entry(topic.into())
            .or_insert_with(|| vec![Vec::new(); partitions as usize]);
        Ok(())
    }

    /// Makes subsequent produce calls succeed (`true`) or fail (`false`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the messages on one partition of `topic`, in offset order.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic or partition does not exist.
    pub fn messages(&self, topic: &str, partition: u32) -> Result<Vec<StoredMessage>> {
        let topics = self.topics.read().map_err(poison_err)?;
        topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .cloned()
            .ok_or_else(|| Error::publication(format!("unknown topic partition {topic}/{partition}")))
    }

    /// Returns every message on `topic`, partition by partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic does not exist.
    pub fn all_messages(&self, topic: &str) -> Result<Vec<StoredMessage>> {
        let topics = self.topics.read().map_err(poison_err)?;
        topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .ok_or_else(|| Error::publication(format!("unknown topic {topic}")))
    }
}

#[async_trait]
impl ResultProducer for InMemoryBroker {
    async fn produce(&self, record: ProducerRecord) -> Result<ProduceAck> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::publication("broker unavailable"));
        }

        let mut topics = self.topics.write().map_err(poison_err)?;
        let partitions = topics
            .get_mut(&record.topic)
            .ok_or_else(|| Error::publication(format!("unknown topic {}", record.topic)))?;

        let count = u32::try_from(partitions.len())
            .map_err(|_| Error::publication("too many partitions"))?;
        let partition = u32::from(record.key.index()) % count;
        let log = partitions
            .get_mut(partition as usize)
            .ok_or_else(|| Error::publication("partition out of range"))?;

        let offset = log.len() as u64;
        log.push(StoredMessage {
            offset,
            key: record.key,
            payload: record.payload,
        });
        drop(topics);

        Ok(ProduceAck { partition, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: u16, body: &'static str) -> ProducerRecord {
        ProducerRecord::new("results", PartitionId::new(key), Bytes::from_static(body.as_bytes()))
    }

    #[tokio::test]
    async fn produce_assigns_partition_by_key() {
        let broker = InMemoryBroker::new();
        broker.create_topic("results", 2).unwrap();

        let first = broker.produce(record(3, "a")).await.unwrap();
        let second = broker.produce(record(1, "b")).await.unwrap();
        let third = broker.produce(record(0, "c")).await.unwrap();

        assert_eq!(first, ProduceAck { partition: 1, offset: 0 });
        assert_eq!(second, ProduceAck { partition: 1, offset: 1 });
        assert_eq!(third, ProduceAck { partition: 0, offset: 0 });

        let messages = broker.messages("results", 1).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload, Bytes::from_static(b"a"));
        assert_eq!(messages[1].payload, Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn unknown_topic_is_a_publication_error() {
        let broker = InMemoryBroker::new();
        let result = broker.produce(record(0, "a")).await;
        assert!(matches!(result, Err(Error::Publication { .. })));
    }

    #[tokio::test]
    async fn unavailable_broker_rejects_records() {
        let broker = InMemoryBroker::new();
        broker.create_topic("results", 1).unwrap();
        broker.set_available(false);

        assert!(broker.produce(record(0, "a")).await.is_err());
        assert!(broker.all_messages("results").unwrap().is_empty());

        broker.set_available(true);
        assert!(broker.produce(record(0, "a")).await.is_ok());
    }

    #[test]
    fn zero_partitions_rejected() {
        let broker = InMemoryBroker::new();
        assert!(broker.create_topic("results", 0).is_err());
    }
}
