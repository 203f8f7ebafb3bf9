//! Result publication contract.
//!
//! This module provides:
//!
//! - [`ResultProducer`]: Trait for delivering encoded results to a broker topic
//! - [`ProducerRecord`]: One keyed message
//! - [`InMemoryBroker`]: In-memory topics for testing
//!
//! Records are keyed by the source partition of the tick that produced them,
//! so a broker that assigns partitions by key keeps each source partition's
//! results in publication order.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use cadence_core::PartitionId;

use crate::error::Result;

pub use memory::InMemoryBroker;

/// A message ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRecord {
    /// Destination topic.
    pub topic: String,
    /// Partitioning key: the source partition of the tick.
    pub key: PartitionId,
    /// Encoded payload.
    pub payload: Bytes,
}

impl ProducerRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(topic: impl Into<String>, key: PartitionId, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            key,
            payload,
        }
    }
}

/// Broker acknowledgement for a delivered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceAck {
    /// Topic partition the record landed on.
    pub partition: u32,
    /// Offset assigned within that partition.
    pub offset: u64,
}

/// Delivers encoded results to a message broker.
///
/// `produce` resolves once the broker has durably accepted the record; the
/// worker awaits each acknowledgement before moving to the next result.
#[async_trait]
pub trait ResultProducer: Send + Sync {
    /// Delivers one record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Publication`] if the broker is unavailable or
    /// rejects the record.
    async fn produce(&self, record: ProducerRecord) -> Result<ProduceAck>;
}
