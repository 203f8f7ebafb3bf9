//! Strongly-typed identifiers for cadence entities.
//!
//! - [`PartitionId`]: index of a commit-log partition. Each partition is
//!   scheduled independently.
//! - [`SubscriptionIdentifier`]: a subscription UUID scoped to the partition
//!   that owns it. Stable for the life of the subscription.
//!
//! # Example
//!
//! ```rust
//! use cadence_core::id::{PartitionId, SubscriptionIdentifier};
//!
//! let id = SubscriptionIdentifier::generate(PartitionId::new(3));
//! let parsed: SubscriptionIdentifier = id.to_string().parse().unwrap();
//! assert_eq!(id, parsed);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Index of a partition of the commit log that produces ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(u16);

impl PartitionId {
    /// Creates a partition ID from its index.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the partition index.
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartitionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u16>().map(Self).map_err(|e| Error::InvalidId {
            message: format!("invalid partition ID '{s}': {e}"),
        })
    }
}

impl From<u16> for PartitionId {
    fn from(index: u16) -> Self {
        Self(index)
    }
}

/// Identifies a subscription within the partition that schedules it.
///
/// The text form is `"{partition}/{uuid}"` with the UUID in simple
/// (undashed, lowercase hex) format. It is also the serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SubscriptionIdentifier {
    partition: PartitionId,
    uuid: Uuid,
}

impl SubscriptionIdentifier {
    /// Creates an identifier from its parts.
    #[must_use]
    pub const fn new(partition: PartitionId, uuid: Uuid) -> Self {
        Self { partition, uuid }
    }

    /// Generates a new identifier with a random UUID on the given partition.
    #[must_use]
    pub fn generate(partition: PartitionId) -> Self {
        Self::new(partition, Uuid::new_v4())
    }

    /// Returns the partition that owns the subscription.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Returns the subscription UUID.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl fmt::Display for SubscriptionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.uuid.simple())
    }
}

impl FromStr for SubscriptionIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (partition, uuid) = s.split_once('/').ok_or_else(|| Error::InvalidId {
            message: format!("invalid subscription identifier '{s}': expected partition/uuid"),
        })?;
        let uuid = Uuid::parse_str(uuid).map_err(|e| Error::InvalidId {
            message: format!("invalid subscription identifier '{s}': {e}"),
        })?;
        Ok(Self::new(partition.parse()?, uuid))
    }
}

impl From<SubscriptionIdentifier> for String {
    fn from(id: SubscriptionIdentifier) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SubscriptionIdentifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
