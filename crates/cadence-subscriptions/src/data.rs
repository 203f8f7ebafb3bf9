//! Subscription definitions.
//!
//! A subscription says what query to run, over which aggregation window, and
//! how often. [`SubscriptionData`] is a sum type over the three supported
//! representations:
//!
//! - [`LegacySubscriptionData`]: condition/aggregation primitives
//! - [`StructuredSubscriptionData`]: a declarative query string
//! - [`DelegateSubscriptionData`]: one of each, with the side chosen per evaluation
//!
//! Every variant builds a [`Request`] for an evaluation timestamp `t` whose
//! conditions restrict it to the subscription's project and to `[t - time_window, t)`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::SubscriptionIdentifier;

use crate::error::{Error, Result};
use crate::request::{Aggregation, Condition, QueryBody, QuerySource, Request, RequestSettings};
use crate::sampling::{Sampler, sample};

/// Longest aggregation window a subscription may use, in seconds (24 hours).
pub const MAX_TIME_WINDOW_SECS: i64 = 86_400;

/// A stored subscription: its identifier and definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Identifier, scoped to the owning partition.
    pub identifier: SubscriptionIdentifier,
    /// Query definition.
    pub data: SubscriptionData,
}

impl Subscription {
    /// Creates a subscription.
    #[must_use]
    pub const fn new(identifier: SubscriptionIdentifier, data: SubscriptionData) -> Self {
        Self { identifier, data }
    }
}

/// Subscription defined by legacy conditions and aggregations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacySubscriptionData {
    /// Project the subscription belongs to.
    pub project_id: u64,
    /// Filters applied in addition to the engine's project and window conditions.
    pub conditions: Vec<Condition>,
    /// Aggregates to compute.
    pub aggregations: Vec<Aggregation>,
    /// Span each evaluation aggregates over.
    #[serde(with = "duration_secs")]
    pub time_window: Duration,
    /// Spacing between evaluations; zero evaluates once per tick.
    #[serde(with = "duration_secs")]
    pub resolution: Duration,
}

impl LegacySubscriptionData {
    /// Creates and validates a legacy subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubscription`] if the window or resolution is
    /// out of range, or if no aggregation is given.
    pub fn new(
        project_id: u64,
        conditions: Vec<Condition>,
        aggregations: Vec<Aggregation>,
        time_window: Duration,
        resolution: Duration,
    ) -> Result<Self> {
        let data = Self {
            project_id,
            conditions,
            aggregations,
            time_window,
            resolution,
        };
        data.validate()?;
        Ok(data)
    }

    /// Checks the definition's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubscription`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_schedule(self.time_window, self.resolution)?;
        if self.aggregations.is_empty() {
            return Err(Error::invalid_subscription(
                "legacy subscription requires at least one aggregation",
            ));
        }
        Ok(())
    }

    /// Builds the request for an evaluation at `timestamp`.
    #[must_use]
    pub fn build_request(&self, timestamp: DateTime<Utc>) -> Request {
        Request {
            project_id: self.project_id,
            source: QuerySource::Legacy,
            body: QueryBody::Legacy {
                conditions: self.conditions.clone(),
                aggregations: self.aggregations.clone(),
            },
            conditions: scoping_conditions(self.project_id, timestamp, self.time_window),
            settings: RequestSettings::default(),
        }
    }
}

/// Subscription defined by a declarative query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSubscriptionData {
    /// Project the subscription belongs to.
    pub project_id: u64,
    /// Query text, e.g. `MATCH (events) SELECT count() AS count`.
    pub query: String,
    /// Span each evaluation aggregates over.
    #[serde(with = "duration_secs")]
    pub time_window: Duration,
    /// Spacing between evaluations; zero evaluates once per tick.
    #[serde(with = "duration_secs")]
    pub resolution: Duration,
}

impl StructuredSubscriptionData {
    /// Creates and validates a structured subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubscription`] if the window or resolution is
    /// out of range, or if the query is blank.
    pub fn new(
        project_id: u64,
        query: impl Into<String>,
        time_window: Duration,
        resolution: Duration,
    ) -> Result<Self> {
        let data = Self {
            project_id,
            query: query.into(),
            time_window,
            resolution,
        };
        data.validate()?;
        Ok(data)
    }

    /// Checks the definition's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubscription`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_schedule(self.time_window, self.resolution)?;
        if self.query.trim().is_empty() {
            return Err(Error::invalid_subscription(
                "structured subscription requires a query",
            ));
        }
        Ok(())
    }

    /// Builds the request for an evaluation at `timestamp`.
    #[must_use]
    pub fn build_request(&self, timestamp: DateTime<Utc>) -> Request {
        Request {
            project_id: self.project_id,
            source: QuerySource::Structured,
            body: QueryBody::Structured {
                query: self.query.clone(),
            },
            conditions: scoping_conditions(self.project_id, timestamp, self.time_window),
            settings: RequestSettings::default(),
        }
    }
}

/// Subscription carrying both representations of the same query.
///
/// Each evaluation routes to exactly one side; the other side's result is
/// never merged into the returned result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateSubscriptionData {
    /// Legacy side.
    pub legacy: LegacySubscriptionData,
    /// Structured side.
    pub structured: StructuredSubscriptionData,
}

/// The requests a Delegate builds for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateRequests {
    /// Request whose result is authoritative.
    pub primary: Request,
    /// Request for the side that was not chosen.
    pub other: Request,
}

impl DelegateSubscriptionData {
    /// Pairs the two sides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubscription`] if either side is invalid or the
    /// sides disagree on project, window, or resolution.
    pub fn new(
        legacy: LegacySubscriptionData,
        structured: StructuredSubscriptionData,
    ) -> Result<Self> {
        let data = Self { legacy, structured };
        data.validate()?;
        Ok(data)
    }

    /// Checks both sides and their agreement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubscription`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        self.legacy.validate()?;
        self.structured.validate()?;
        if self.legacy.project_id != self.structured.project_id
            || self.legacy.time_window != self.structured.time_window
            || self.legacy.resolution != self.structured.resolution
        {
            return Err(Error::invalid_subscription(
                "delegate sides must share project, time window and resolution",
            ));
        }
        Ok(())
    }

    /// Picks the side for an evaluation from a roll in `[0, 1)`.
    #[must_use]
    pub fn route(roll: f64, rollout_pct: f64) -> QuerySource {
        if sample(roll, rollout_pct) {
            QuerySource::Structured
        } else {
            QuerySource::Legacy
        }
    }

    /// Builds the request of one side.
    #[must_use]
    pub fn build_request(&self, timestamp: DateTime<Utc>, source: QuerySource) -> Request {
        match source {
            QuerySource::Legacy => self.legacy.build_request(timestamp),
            QuerySource::Structured => self.structured.build_request(timestamp),
        }
    }

    /// Builds both requests, ordered by the routing decision for `roll`.
    #[must_use]
    pub fn build_routed(
        &self,
        timestamp: DateTime<Utc>,
        roll: f64,
        rollout_pct: f64,
    ) -> DelegateRequests {
        let chosen = Self::route(roll, rollout_pct);
        let other = match chosen {
            QuerySource::Legacy => QuerySource::Structured,
            QuerySource::Structured => QuerySource::Legacy,
        };
        DelegateRequests {
            primary: self.build_request(timestamp, chosen),
            other: self.build_request(timestamp, other),
        }
    }
}

/// A subscription definition in any representation.
///
/// Deserialization validates the definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "TaggedSubscriptionData")]
pub enum SubscriptionData {
    /// Condition/aggregation definition.
    Legacy(LegacySubscriptionData),
    /// Query-string definition.
    Structured(StructuredSubscriptionData),
    /// Both, routed per evaluation.
    Delegate(DelegateSubscriptionData),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedSubscriptionData {
    Legacy(LegacySubscriptionData),
    Structured(StructuredSubscriptionData),
    Delegate(DelegateSubscriptionData),
}

impl TryFrom<TaggedSubscriptionData> for SubscriptionData {
    type Error = Error;

    fn try_from(tagged: TaggedSubscriptionData) -> Result<Self> {
        let data = match tagged {
            TaggedSubscriptionData::Legacy(data) => Self::Legacy(data),
            TaggedSubscriptionData::Structured(data) => Self::Structured(data),
            TaggedSubscriptionData::Delegate(data) => Self::Delegate(data),
        };
        data.validate()?;
        Ok(data)
    }
}

/// Requests built for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    /// Request whose result is published.
    pub request: Request,
    /// Request to run only for comparison (Delegate variants, when sampled).
    pub comparison: Option<Request>,
}

impl SubscriptionData {
    /// Returns the project the subscription belongs to.
    #[must_use]
    pub const fn project_id(&self) -> u64 {
        match self {
            Self::Legacy(data) => data.project_id,
            Self::Structured(data) => data.project_id,
            Self::Delegate(data) => data.legacy.project_id,
        }
    }

    /// Returns the aggregation window.
    #[must_use]
    pub const fn time_window(&self) -> Duration {
        match self {
            Self::Legacy(data) => data.time_window,
            Self::Structured(data) => data.time_window,
            Self::Delegate(data) => data.legacy.time_window,
        }
    }

    /// Returns the evaluation spacing.
    #[must_use]
    pub const fn resolution(&self) -> Duration {
        match self {
            Self::Legacy(data) => data.resolution,
            Self::Structured(data) => data.resolution,
            Self::Delegate(data) => data.legacy.resolution,
        }
    }

    /// Checks the definition's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubscription`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Legacy(data) => data.validate(),
            Self::Structured(data) => data.validate(),
            Self::Delegate(data) => data.validate(),
        }
    }

    /// Builds the request(s) for an evaluation at `timestamp`.
    ///
    /// Delegate variants draw their routing roll and comparison decision from
    /// `sampler`; the other variants ignore it.
    #[must_use]
    pub fn build_request(&self, timestamp: DateTime<Utc>, sampler: &Sampler) -> BuiltRequest {
        match self {
            Self::Legacy(data) => BuiltRequest {
                request: data.build_request(timestamp),
                comparison: None,
            },
            Self::Structured(data) => BuiltRequest {
                request: data.build_request(timestamp),
                comparison: None,
            },
            Self::Delegate(data) => {
                let routed = data.build_routed(timestamp, sampler.roll(), sampler.rollout_pct());
                BuiltRequest {
                    request: routed.primary,
                    comparison: sampler.compare_delegate().then_some(routed.other),
                }
            }
        }
    }
}

impl From<LegacySubscriptionData> for SubscriptionData {
    fn from(data: LegacySubscriptionData) -> Self {
        Self::Legacy(data)
    }
}

impl From<StructuredSubscriptionData> for SubscriptionData {
    fn from(data: StructuredSubscriptionData) -> Self {
        Self::Structured(data)
    }
}

impl From<DelegateSubscriptionData> for SubscriptionData {
    fn from(data: DelegateSubscriptionData) -> Self {
        Self::Delegate(data)
    }
}

fn scoping_conditions(
    project_id: u64,
    timestamp: DateTime<Utc>,
    time_window: Duration,
) -> Vec<Condition> {
    let [from, to] = Condition::time_window(timestamp, time_window);
    vec![Condition::project(project_id), from, to]
}

fn validate_schedule(time_window: Duration, resolution: Duration) -> Result<()> {
    if time_window <= Duration::zero() || time_window > Duration::seconds(MAX_TIME_WINDOW_SECS) {
        return Err(Error::invalid_subscription(format!(
            "time window must be between 1s and {MAX_TIME_WINDOW_SECS}s, got {}s",
            time_window.num_seconds()
        )));
    }
    if time_window.subsec_nanos() != 0 {
        return Err(Error::invalid_subscription(
            "time window must be a whole number of seconds",
        ));
    }
    if resolution < Duration::zero() || resolution.subsec_nanos() != 0 {
        return Err(Error::invalid_subscription(
            "resolution must be a non-negative whole number of seconds",
        ));
    }
    Ok(())
}

/// Serializes a [`Duration`] as whole seconds.
mod duration_secs {
    use chrono::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        Duration::try_seconds(seconds)
            .ok_or_else(|| D::Error::custom(format!("duration of {seconds}s is out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ConditionOp, Literal, PROJECT_COLUMN};
    use cadence_core::InMemoryRuntimeConfig;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn legacy() -> LegacySubscriptionData {
        LegacySubscriptionData::new(
            1,
            vec![],
            vec![Aggregation::new("count()", "", "count")],
            Duration::minutes(60),
            Duration::minutes(1),
        )
        .unwrap()
    }

    fn structured() -> StructuredSubscriptionData {
        StructuredSubscriptionData::new(
            1,
            "MATCH (events) SELECT count() AS count",
            Duration::minutes(60),
            Duration::minutes(1),
        )
        .unwrap()
    }

    fn sampler(values: &[(&'static str, f64)]) -> Sampler {
        let config = Arc::new(InMemoryRuntimeConfig::with_values(values.iter().copied()));
        Sampler::with_seed(config, 42)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn legacy_request_is_scoped() {
        let request = legacy().build_request(now());

        assert_eq!(request.source, QuerySource::Legacy);
        assert!(request.has_time_window(now(), Duration::minutes(60)));
        assert!(request.conditions.contains(&Condition::new(
            PROJECT_COLUMN,
            ConditionOp::Eq,
            Literal::UInt(1)
        )));
    }

    #[test]
    fn structured_request_keeps_query_text() {
        let request = structured().build_request(now());

        assert_eq!(request.source, QuerySource::Structured);
        assert_eq!(
            request.body,
            QueryBody::Structured {
                query: "MATCH (events) SELECT count() AS count".into()
            }
        );
        assert!(request.has_time_window(now(), Duration::minutes(60)));
    }

    #[test]
    fn rejects_out_of_range_windows() {
        let too_long = StructuredSubscriptionData::new(1, "q", Duration::days(2), Duration::minutes(1));
        assert!(matches!(too_long, Err(Error::InvalidSubscription { .. })));

        let empty = StructuredSubscriptionData::new(1, "q", Duration::zero(), Duration::minutes(1));
        assert!(empty.is_err());

        let fractional = StructuredSubscriptionData::new(
            1,
            "q",
            Duration::milliseconds(1_500),
            Duration::minutes(1),
        );
        assert!(fractional.is_err());
    }

    #[test]
    fn rejects_fractional_or_negative_resolution() {
        assert!(StructuredSubscriptionData::new(1, "q", Duration::hours(1), Duration::milliseconds(500)).is_err());
        assert!(StructuredSubscriptionData::new(1, "q", Duration::hours(1), Duration::seconds(-1)).is_err());
        assert!(StructuredSubscriptionData::new(1, "q", Duration::hours(1), Duration::zero()).is_ok());
    }

    #[test]
    fn rejects_blank_query_and_missing_aggregations() {
        assert!(StructuredSubscriptionData::new(1, "   ", Duration::hours(1), Duration::minutes(1)).is_err());
        assert!(LegacySubscriptionData::new(1, vec![], vec![], Duration::hours(1), Duration::minutes(1)).is_err());
    }

    #[test]
    fn delegate_sides_must_agree() {
        let mut other = structured();
        other.resolution = Duration::minutes(5);
        assert!(DelegateSubscriptionData::new(legacy(), other).is_err());
        assert!(DelegateSubscriptionData::new(legacy(), structured()).is_ok());
    }

    #[test]
    fn delegate_route_is_pure() {
        assert_eq!(DelegateSubscriptionData::route(0.3, 0.5), QuerySource::Structured);
        assert_eq!(DelegateSubscriptionData::route(0.7, 0.5), QuerySource::Legacy);
        assert_eq!(DelegateSubscriptionData::route(0.0, 0.0), QuerySource::Legacy);
        assert_eq!(DelegateSubscriptionData::route(0.999, 1.0), QuerySource::Structured);
    }

    #[test]
    fn delegate_routed_requests_cover_both_sides() {
        let delegate = DelegateSubscriptionData::new(legacy(), structured()).unwrap();
        let routed = delegate.build_routed(now(), 0.1, 0.5);

        assert_eq!(routed.primary.source, QuerySource::Structured);
        assert_eq!(routed.other.source, QuerySource::Legacy);
    }

    #[test]
    fn delegate_build_follows_rollout() {
        let data = SubscriptionData::from(DelegateSubscriptionData::new(legacy(), structured()).unwrap());

        let all_structured = sampler(&[(crate::sampling::keys::ROLLOUT_PCT, 1.0)]);
        for _ in 0..50 {
            let built = data.build_request(now(), &all_structured);
            assert_eq!(built.request.source, QuerySource::Structured);
            assert!(built.comparison.is_none());
        }

        let all_legacy = sampler(&[(crate::sampling::keys::ROLLOUT_PCT, 0.0)]);
        for _ in 0..50 {
            assert_eq!(data.build_request(now(), &all_legacy).request.source, QuerySource::Legacy);
        }
    }

    #[test]
    fn delegate_comparison_builds_other_side() {
        let data = SubscriptionData::from(DelegateSubscriptionData::new(legacy(), structured()).unwrap());
        let sampler = sampler(&[
            (crate::sampling::keys::ROLLOUT_PCT, 1.0),
            (crate::sampling::keys::DELEGATE_COMPARISON_PCT, 1.0),
        ]);

        let built = data.build_request(now(), &sampler);
        assert_eq!(built.request.source, QuerySource::Structured);
        assert_eq!(built.comparison.map(|r| r.source), Some(QuerySource::Legacy));
    }

    #[test]
    fn accessors_agree_across_variants() {
        let variants: Vec<SubscriptionData> = vec![
            legacy().into(),
            structured().into(),
            DelegateSubscriptionData::new(legacy(), structured()).unwrap().into(),
        ];
        for data in variants {
            assert_eq!(data.project_id(), 1);
            assert_eq!(data.time_window(), Duration::minutes(60));
            assert_eq!(data.resolution(), Duration::minutes(1));
            assert!(data.validate().is_ok());
        }
    }

    #[test]
    fn serializes_with_type_tag() {
        let data = SubscriptionData::from(structured());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["type"], "structured");
        assert_eq!(json["time_window"], 3600);
        assert_eq!(json["resolution"], 60);

        let parsed: SubscriptionData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn deserialization_rejects_invalid_definitions() {
        let blank_query = serde_json::json!({
            "type": "structured",
            "project_id": 1,
            "query": "  ",
            "time_window": 3600,
            "resolution": 60,
        });
        let err = serde_json::from_value::<SubscriptionData>(blank_query).unwrap_err();
        assert!(err.to_string().contains("invalid subscription"), "{err}");

        let negative_resolution = serde_json::json!({
            "type": "structured",
            "project_id": 1,
            "query": "MATCH (events) SELECT count()",
            "time_window": 3600,
            "resolution": -60,
        });
        assert!(serde_json::from_value::<SubscriptionData>(negative_resolution).is_err());
    }
}
