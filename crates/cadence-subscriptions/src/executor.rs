//! Query execution contract.
//!
//! The executor runs a built [`Request`] against the query engine. Its
//! failures are [`ExecutionError`] values, which stay attached to the task
//! that produced them instead of aborting the batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::request::Request;
use crate::value::QueryValue;

/// Classification of a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// The engine ran the query and reported an error.
    Query,
    /// The engine refused the query (rate limit, invalid request).
    Rejected,
    /// The engine could not be reached.
    Unavailable,
}

impl ExecutionErrorKind {
    /// Returns the metric/log label for the kind.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Rejected => "rejected",
            Self::Unavailable => "unavailable",
        }
    }
}

/// A failed query execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{} error: {message}", kind.as_label())]
pub struct ExecutionError {
    /// Failure class.
    pub kind: ExecutionErrorKind,
    /// Engine-provided description.
    pub message: String,
}

impl ExecutionError {
    /// Creates an execution error.
    #[must_use]
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a query error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Query, message)
    }

    /// Creates a rejection.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Rejected, message)
    }

    /// Creates an unavailability error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Unavailable, message)
    }
}

/// Runs requests against the query engine.
///
/// The consistency mode and referrer travel in [`Request::settings`].
/// Implementations are shared across concurrently executing tasks.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `request` and returns the raw, unsanitized response.
    async fn execute(&self, request: &Request) -> Result<QueryValue, ExecutionError>;
}

/// An executor that answers every request with the same response.
#[derive(Debug, Clone, Default)]
pub struct StaticExecutor {
    response: QueryValue,
}

impl StaticExecutor {
    /// Creates an executor returning `response`.
    #[must_use]
    pub const fn new(response: QueryValue) -> Self {
        Self { response }
    }
}

#[async_trait]
impl QueryExecutor for StaticExecutor {
    async fn execute(&self, _request: &Request) -> Result<QueryValue, ExecutionError> {
        Ok(self.response.clone())
    }
}

/// An executor that always fails with a configurable error.
#[derive(Debug, Clone)]
pub struct FailingExecutor {
    error: ExecutionError,
}

impl FailingExecutor {
    /// Creates an executor failing with `error`.
    #[must_use]
    pub const fn new(error: ExecutionError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl QueryExecutor for FailingExecutor {
    async fn execute(&self, _request: &Request) -> Result<QueryValue, ExecutionError> {
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StructuredSubscriptionData;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> Request {
        StructuredSubscriptionData::new(1, "MATCH (e) SELECT count()", Duration::hours(1), Duration::minutes(1))
            .unwrap()
            .build_request(Utc::now())
    }

    struct CountingExecutor {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn execute(&self, _request: &Request) -> Result<QueryValue, ExecutionError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(QueryValue::UInt(100))
        }
    }

    #[tokio::test]
    async fn static_executor_returns_response() {
        let executor = StaticExecutor::new(QueryValue::object([("count", QueryValue::UInt(3))]));
        let response = executor.execute(&request()).await.unwrap();
        assert_eq!(response.get("count"), Some(&QueryValue::UInt(3)));
    }

    #[tokio::test]
    async fn failing_executor_returns_error() {
        let executor = FailingExecutor::new(ExecutionError::unavailable("connection refused"));
        let err = executor.execute(&request()).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Unavailable);
        assert_eq!(err.to_string(), "unavailable error: connection refused");
    }

    #[tokio::test]
    async fn executor_is_object_safe() {
        let count = Arc::new(AtomicUsize::new(0));
        let executor: Arc<dyn QueryExecutor> = Arc::new(CountingExecutor {
            count: Arc::clone(&count),
        });

        executor.execute(&request()).await.unwrap();
        executor.execute(&request()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
