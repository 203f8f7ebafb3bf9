//! In-memory subscription store for testing.
//!
//! [`InMemorySubscriptionStore`] keeps definitions in insertion order and can
//! be switched offline to exercise the scheduler's failure path.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability
//! - **Single-process only**: State is not shared across process boundaries

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use uuid::Uuid;

use super::SubscriptionDataStore;
use crate::data::SubscriptionData;
use crate::error::{Error, Result};

/// In-memory store for testing.
///
/// ## Example
///
/// ```rust
/// use cadence_subscriptions::store::memory::InMemorySubscriptionStore;
///
/// let store = InMemorySubscriptionStore::new();
/// assert_eq!(store.len().unwrap(), 0);
/// ```
#[derive(Debug)]
pub struct InMemorySubscriptionStore {
    entries: RwLock<IndexMap<Uuid, SubscriptionData>>,
    available: AtomicBool,
}

impl Default for InMemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("subscription store lock poisoned")
}

impl InMemorySubscriptionStore {
    /// Creates an empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent call succeed (`true`) or fail as unreachable (`false`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the number of stored subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let count = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries.len()
        };
        Ok(count)
    }

    /// Returns true if no subscription is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::storage("subscription store unavailable"))
        }
    }
}

#[async_trait]
impl SubscriptionDataStore for InMemorySubscriptionStore {
    async fn create(&self, key: Uuid, data: SubscriptionData) -> Result<()> {
        self.ensure_available()?;
        data.validate()?;
        {
            let mut entries = self.entries.write().map_err(poison_err)?;
            entries.insert(key, data);
        }
        Ok(())
    }

    async fn delete(&self, key: &Uuid) -> Result<()> {
        self.ensure_available()?;
        {
            let mut entries = self.entries.write().map_err(poison_err)?;
            entries.shift_remove(key);
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(Uuid, SubscriptionData)>> {
        self.ensure_available()?;
        let snapshot = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries
                .iter()
                .map(|(key, data)| (*key, data.clone()))
                .collect()
        };
        Ok(snapshot)
    }
}
