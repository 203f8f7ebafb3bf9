//! Executable query requests.
//!
//! A [`Request`] is what a subscription hands to the query-execution
//! collaborator for one evaluation. The body is either a legacy
//! condition/aggregation query or a structured query string; both are
//! constrained by explicit [`Condition`]s covering the project and the
//! evaluation's time window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column every time-window condition is applied to.
pub const TIMESTAMP_COLUMN: &str = "timestamp";
/// Column carrying the project a subscription belongs to.
pub const PROJECT_COLUMN: &str = "project_id";
/// Referrer attached to every subscription request.
pub const SUBSCRIPTION_REFERRER: &str = "subscription";

/// Comparison operator in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOp {
    /// Equality.
    #[serde(rename = "=")]
    Eq,
    /// Inequality.
    #[serde(rename = "!=")]
    NotEq,
    /// Strictly greater.
    #[serde(rename = ">")]
    Gt,
    /// Greater or equal.
    #[serde(rename = ">=")]
    Gte,
    /// Strictly less.
    #[serde(rename = "<")]
    Lt,
    /// Less or equal.
    #[serde(rename = "<=")]
    Lte,
    /// Membership in a list.
    #[serde(rename = "IN")]
    In,
    /// Non-membership in a list.
    #[serde(rename = "NOT IN")]
    NotIn,
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// SQL null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer, e.g. a project id.
    #[serde(rename = "uint")]
    UInt(u64),
    /// Floating point.
    Float(f64),
    /// String.
    String(String),
    /// Point in time.
    DateTime(DateTime<Utc>),
    /// List of literals, for `IN` conditions.
    List(Vec<Literal>),
}

/// A `column op literal` filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Column the condition applies to.
    pub column: String,
    /// Comparison operator.
    pub op: ConditionOp,
    /// Right-hand operand.
    pub value: Literal,
}

impl Condition {
    /// Creates a condition.
    #[must_use]
    pub fn new(column: impl Into<String>, op: ConditionOp, value: Literal) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Returns the pair of conditions bounding `[timestamp - window, timestamp)`.
    #[must_use]
    pub fn time_window(timestamp: DateTime<Utc>, window: chrono::Duration) -> [Self; 2] {
        [
            Self::new(
                TIMESTAMP_COLUMN,
                ConditionOp::Gte,
                Literal::DateTime(timestamp - window),
            ),
            Self::new(TIMESTAMP_COLUMN, ConditionOp::Lt, Literal::DateTime(timestamp)),
        ]
    }

    /// Returns the condition restricting a request to `project_id`.
    #[must_use]
    pub fn project(project_id: u64) -> Self {
        Self::new(
            PROJECT_COLUMN,
            ConditionOp::Eq,
            Literal::UInt(project_id),
        )
    }
}

/// An aggregate expression in a legacy query, e.g. `count()` aliased as `count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Aggregate function, e.g. `count()` or `uniq`.
    pub function: String,
    /// Column the function applies to; empty for nullary functions.
    pub column: String,
    /// Output alias.
    pub alias: String,
}

impl Aggregation {
    /// Creates an aggregation.
    #[must_use]
    pub fn new(
        function: impl Into<String>,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            function: function.into(),
            column: column.into(),
            alias: alias.into(),
        }
    }
}

/// Which representation produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    /// Condition/aggregation primitives.
    Legacy,
    /// Declarative query string.
    Structured,
}

impl QuerySource {
    /// Returns the metric/log label for the source.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Structured => "structured",
        }
    }
}

/// Query body of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryBody {
    /// Legacy condition/aggregation query.
    Legacy {
        /// Subscription-defined filters.
        conditions: Vec<Condition>,
        /// Aggregates to compute.
        aggregations: Vec<Aggregation>,
    },
    /// Structured query string, handed to the translation layer untouched.
    Structured {
        /// The query text.
        query: String,
    },
}

/// Per-request execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSettings {
    /// Whether the query must read with strong consistency.
    pub consistent: bool,
    /// Attribution for the query engine.
    pub referrer: String,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            consistent: false,
            referrer: SUBSCRIPTION_REFERRER.to_string(),
        }
    }
}

/// A request ready for the query-execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Project the subscription belongs to.
    pub project_id: u64,
    /// Representation that built the request.
    pub source: QuerySource,
    /// Query body.
    pub body: QueryBody,
    /// Engine-injected conditions (project and time window), ANDed with the body.
    pub conditions: Vec<Condition>,
    /// Execution settings.
    pub settings: RequestSettings,
}

impl Request {
    /// Returns true if the request carries the `[timestamp - window, timestamp)` bounds.
    #[must_use]
    pub fn has_time_window(&self, timestamp: DateTime<Utc>, window: chrono::Duration) -> bool {
        Condition::time_window(timestamp, window)
            .iter()
            .all(|bound| self.conditions.contains(bound))
    }

    /// Returns the evaluation timestamp, the exclusive upper time bound.
    #[must_use]
    pub fn evaluation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.conditions.iter().find_map(|condition| match condition {
            Condition {
                column,
                op: ConditionOp::Lt,
                value: Literal::DateTime(timestamp),
            } if column == TIMESTAMP_COLUMN => Some(*timestamp),
            _ => None,
        })
    }
}
