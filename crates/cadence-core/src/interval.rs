//! Validated closed ranges.
//!
//! An [`Interval`] describes the span a commit-log consumer advanced through,
//! either in offsets or in wall-clock timestamps. The upper bound never
//! precedes the lower bound.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A range bounded by `lower` and `upper`, with `lower <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalBounds<T>")]
#[serde(bound(deserialize = "T: Deserialize<'de> + PartialOrd + fmt::Debug"))]
pub struct Interval<T> {
    lower: T,
    upper: T,
}

#[derive(Deserialize)]
struct IntervalBounds<T> {
    lower: T,
    upper: T,
}

impl<T: PartialOrd + fmt::Debug> TryFrom<IntervalBounds<T>> for Interval<T> {
    type Error = Error;

    fn try_from(bounds: IntervalBounds<T>) -> Result<Self> {
        Self::new(bounds.lower, bounds.upper)
    }
}

impl<T: PartialOrd + fmt::Debug> Interval<T> {
    /// Creates an interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] if `upper < lower`.
    pub fn new(lower: T, upper: T) -> Result<Self> {
        if upper < lower {
            return Err(Error::InvalidInterval {
                message: format!("upper bound {upper:?} precedes lower bound {lower:?}"),
            });
        }
        Ok(Self { lower, upper })
    }

    /// Returns true if `value` lies in `(lower, upper]`.
    ///
    /// Adjacent intervals sharing a bound therefore never both contain the
    /// shared value.
    #[must_use]
    pub fn contains_left_open(&self, value: &T) -> bool {
        self.lower < *value && *value <= self.upper
    }
}

impl<T> Interval<T> {
    /// Returns the lower bound.
    pub const fn lower(&self) -> &T {
        &self.lower
    }

    /// Returns the upper bound.
    pub const fn upper(&self) -> &T {
        &self.upper
    }

    /// Returns the interval with both bounds moved by `delta`.
    #[must_use]
    pub fn shifted<D>(&self, delta: D) -> Self
    where
        T: Add<D, Output = T> + Copy,
        D: Copy,
    {
        Self {
            lower: self.lower + delta,
            upper: self.upper + delta,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Interval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        let err = Interval::new(5_u64, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidInterval { .. }));
    }

    #[test]
    fn accepts_empty_interval() {
        let interval = Interval::new(3_u64, 3).unwrap();
        assert_eq!(*interval.lower(), 3);
        assert_eq!(*interval.upper(), 3);
        assert!(!interval.contains_left_open(&3));
    }

    #[test]
    fn left_open_membership() {
        let interval = Interval::new(10_i64, 20).unwrap();
        assert!(!interval.contains_left_open(&10));
        assert!(interval.contains_left_open(&11));
        assert!(interval.contains_left_open(&20));
        assert!(!interval.contains_left_open(&21));
    }

    #[test]
    fn shifted_moves_both_bounds() {
        let interval = Interval::new(10_i64, 20).unwrap().shifted(-5);
        assert_eq!(*interval.lower(), 5);
        assert_eq!(*interval.upper(), 15);
    }

    #[test]
    fn deserialize_validates_bounds() {
        let ok: Interval<u64> = serde_json::from_str(r#"{"lower":1,"upper":4}"#).unwrap();
        assert_eq!(*ok.upper(), 4);

        let err = serde_json::from_str::<Interval<u64>>(r#"{"lower":9,"upper":4}"#);
        assert!(err.is_err());
    }
}
