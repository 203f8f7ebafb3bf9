//! Query responses and NaN sanitization.
//!
//! Responses from the query engine are nested maps and sequences of
//! primitive values. Floating point results may be NaN, which JSON cannot
//! represent (serializers silently turn it into `null`). [`handle_nan`]
//! rewrites every NaN leaf to the string `"nan"` and must be applied to every
//! response before it is published.
//!
//! Object keys keep their original order through sanitization and serialization.
//!
//! Infinities are not sanitized. They pass through [`handle_nan`] untouched
//! and serialize as `null`, so a published `null` may stand for `±inf`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Literal published in place of a NaN float.
pub const NAN_LITERAL: &str = "nan";

/// A nested query response value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// Null / missing value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned integer.
    UInt(u64),
    /// Signed integer.
    Int(i64),
    /// Floating point, possibly NaN before sanitization.
    Float(f64),
    /// String.
    String(String),
    /// Ordered sequence.
    Array(Vec<QueryValue>),
    /// Mapping with insertion-ordered keys.
    Object(IndexMap<String, QueryValue>),
}

impl QueryValue {
    /// Builds an object from key/value pairs, preserving their order.
    #[must_use]
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds an array.
    #[must_use]
    pub fn array(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Array(items.into_iter().collect())
    }

    /// Returns the value under `key` if this is an object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns true if any leaf is a NaN float.
    #[must_use]
    pub fn contains_nan(&self) -> bool {
        match self {
            Self::Float(f) => f.is_nan(),
            Self::Array(items) => items.iter().any(Self::contains_nan),
            Self::Object(map) => map.values().any(Self::contains_nan),
            _ => false,
        }
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for QueryValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Replaces every NaN float in `value` with the string `"nan"`.
///
/// All other leaves, including nulls, infinities and other non-NaN numbers,
/// are returned unchanged. Objects and arrays are rebuilt in their original
/// order.
#[must_use]
pub fn handle_nan(value: QueryValue) -> QueryValue {
    match value {
        QueryValue::Float(f) if f.is_nan() => QueryValue::String(NAN_LITERAL.to_string()),
        QueryValue::Array(items) => QueryValue::Array(items.into_iter().map(handle_nan).collect()),
        QueryValue::Object(map) => {
            QueryValue::Object(map.into_iter().map(|(k, v)| (k, handle_nan(v))).collect())
        }
        other => other,
    }
}
