//! Error types for the subscription engine.
//!
//! Failures fall into three classes:
//!
//! - **Scheduling**: the store could not be read; fatal for the tick
//! - **Execution**: a single query failed; isolated to its task (see
//!   [`crate::executor::ExecutionError`], which is not an [`Error`])
//! - **Publication**: results could not be delivered; fatal for the flush

use std::time::Duration;

use chrono::{DateTime, Utc};

use cadence_core::{PartitionId, SubscriptionIdentifier};

/// The result type used throughout cadence-subscriptions.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in subscription scheduling and delivery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Scheduling a tick failed; no partial schedule was produced.
    #[error("scheduling failed for partition {partition}: {source}")]
    Scheduling {
        /// The partition whose tick could not be scheduled.
        partition: PartitionId,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// A subscription definition is not valid.
    #[error("invalid subscription: {message}")]
    InvalidSubscription {
        /// Description of the validation failure.
        message: String,
    },

    /// A task did not complete within the execution timeout.
    #[error("execution of {subscription} at {timestamp} did not complete within {timeout:?}")]
    ExecutionTimeout {
        /// The subscription being evaluated.
        subscription: SubscriptionIdentifier,
        /// The evaluation timestamp.
        timestamp: DateTime<Utc>,
        /// The configured timeout.
        timeout: Duration,
    },

    /// A task's execution was aborted before producing an outcome.
    #[error("execution of {subscription} at {timestamp} aborted: {message}")]
    TaskAborted {
        /// The subscription being evaluated.
        subscription: SubscriptionIdentifier,
        /// The evaluation timestamp.
        timestamp: DateTime<Utc>,
        /// Description of the abort (panic or cancellation).
        message: String,
    },

    /// A result could not be published.
    #[error("publication failed: {message}")]
    Publication {
        /// Description of the publication failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A configuration value was missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from cadence-core.
    #[error("core error: {0}")]
    Core(#[from] cadence_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new publication error.
    #[must_use]
    pub fn publication(message: impl Into<String>) -> Self {
        Self::Publication {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new invalid subscription error.
    #[must_use]
    pub fn invalid_subscription(message: impl Into<String>) -> Self {
        Self::InvalidSubscription {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wraps `self` as the cause of a failed schedule for `partition`.
    #[must_use]
    pub fn scheduling(self, partition: PartitionId) -> Self {
        Self::Scheduling {
            partition,
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn scheduling_error_wraps_cause() {
        let err = Error::storage("store unreachable").scheduling(PartitionId::new(3));
        let msg = err.to_string();
        assert!(msg.contains("partition 3"));
        assert!(msg.contains("store unreachable"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn timeout_error_display() {
        let err = Error::ExecutionTimeout {
            subscription: SubscriptionIdentifier::generate(PartitionId::new(0)),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("did not complete within 5s"));
    }

    #[test]
    fn core_error_converts() {
        let err: Error = cadence_core::Error::InvalidId {
            message: "bad".into(),
        }
        .into();
        assert!(matches!(err, Error::Core(_)));
    }
}
