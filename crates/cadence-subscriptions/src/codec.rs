//! Wire format of published results.
//!
//! Each result is one JSON message:
//!
//! ```json
//! {
//!   "version": 2,
//!   "payload": {
//!     "subscription_identifier": "0/6d1a...",
//!     "evaluation_timestamp": "2000-01-01T00:01:00Z",
//!     "request_summary": { ... },
//!     "response": { "data": [ ... ] }
//!   }
//! }
//! ```
//!
//! Messages are keyed by the source partition so per-partition order survives
//! broker partitioning. `(subscription_identifier, evaluation_timestamp)` is
//! the idempotency key consumers deduplicate redelivered results on.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::{PartitionId, SubscriptionIdentifier};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::scheduler::ScheduledTask;
use crate::value::QueryValue;

/// Envelope version written by [`SubscriptionTaskResultCodec::encode`].
pub const RESULT_VERSION: u32 = 2;

/// A task paired with the request it ran and its sanitized response.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionTaskResult {
    /// The evaluated task.
    pub task: ScheduledTask,
    /// The request that produced the response.
    pub request: Request,
    /// The response, already passed through [`crate::value::handle_nan`].
    pub response: QueryValue,
}

/// A result as read back from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedResult {
    /// Subscription that was evaluated.
    pub subscription_identifier: SubscriptionIdentifier,
    /// Logical time of the evaluation.
    pub evaluation_timestamp: DateTime<Utc>,
    /// The request as executed.
    pub request_summary: Request,
    /// The sanitized response.
    pub response: QueryValue,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    subscription_identifier: &'a SubscriptionIdentifier,
    evaluation_timestamp: &'a DateTime<Utc>,
    request_summary: &'a Request,
    response: &'a QueryValue,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    payload: PayloadRef<'a>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    payload: PublishedResult,
}

/// Encodes and decodes result messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionTaskResultCodec;

impl SubscriptionTaskResultCodec {
    /// Returns the message key for a result: its source partition.
    #[must_use]
    pub fn key(result: &SubscriptionTaskResult) -> PartitionId {
        result.task.identifier().partition()
    }

    /// Serializes a result into a versioned envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the payload cannot be encoded.
    pub fn encode(result: &SubscriptionTaskResult) -> Result<Bytes> {
        let envelope = EnvelopeRef {
            version: RESULT_VERSION,
            payload: PayloadRef {
                subscription_identifier: result.task.identifier(),
                evaluation_timestamp: &result.task.timestamp,
                request_summary: &result.request,
                response: &result.response,
            },
        };
        let encoded = serde_json::to_vec(&envelope).map_err(|e| Error::Serialization {
            message: format!("failed to encode subscription result: {e}"),
        })?;
        Ok(Bytes::from(encoded))
    }

    /// Parses an envelope written by [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the bytes are not a valid envelope
    /// or carry an unsupported version.
    pub fn decode(bytes: &[u8]) -> Result<PublishedResult> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.version != RESULT_VERSION {
            return Err(Error::Serialization {
                message: format!(
                    "unsupported subscription result version {} (expected {RESULT_VERSION})",
                    probe.version
                ),
            });
        }
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        Ok(envelope.payload)
    }
}
