//! Subscription persistence contract.
//!
//! The [`SubscriptionDataStore`] trait is the engine's only view of where
//! subscriptions live. One store backs one partition; identifiers are the
//! subscription UUIDs, and the scheduler pairs them with its partition.
//!
//! ## Guarantees assumed
//!
//! - **Snapshot-at-read**: [`SubscriptionDataStore::all`] returns a consistent
//!   snapshot; writes that land after it are seen by the next call.
//! - **Stable enumeration order**: the scheduler emits tasks in the order
//!   `all` returns subscriptions, so implementations keep that order stable.
//! - **Read-only from the engine**: schedulers only call `all` and may call
//!   it concurrently without coordination.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::data::SubscriptionData;
use crate::error::Result;

/// Key-value store mapping subscription UUIDs to their definitions.
#[async_trait]
pub trait SubscriptionDataStore: Send + Sync {
    /// Stores `data` under `key`, replacing any existing definition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidSubscription`] if `data` fails
    /// validation, or a storage error if the backend is unreachable.
    async fn create(&self, key: Uuid, data: SubscriptionData) -> Result<()>;

    /// Removes the definition under `key`. Removing a missing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend is unreachable.
    async fn delete(&self, key: &Uuid) -> Result<()>;

    /// Returns every stored subscription in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend is unreachable or holds a
    /// corrupt entry.
    async fn all(&self) -> Result<Vec<(Uuid, SubscriptionData)>>;
}
