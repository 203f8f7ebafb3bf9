//! Ticks: the unit of progress handed over by the commit-log consumer.
//!
//! A [`Tick`] records one advance of a partition's commit log as an offset
//! interval and the wall-clock interval it represents. Successive ticks of a
//! partition are contiguous: `tick[n].timestamps.upper == tick[n + 1].timestamps.lower`.
//! Each resolution-aligned timestamp is owned by exactly one tick, the one
//! whose left-open interval `(lower, upper]` contains it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::{Interval, PartitionId};

/// One contiguous advance of a partition's commit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Offsets consumed since the previous tick.
    pub offsets: Interval<u64>,
    /// Wall-clock span those offsets represent.
    pub timestamps: Interval<DateTime<Utc>>,
}

impl Tick {
    /// Creates a tick.
    #[must_use]
    pub const fn new(offsets: Interval<u64>, timestamps: Interval<DateTime<Utc>>) -> Self {
        Self {
            offsets,
            timestamps,
        }
    }

    /// Returns the tick with its timestamp interval moved by `delta`.
    ///
    /// Consumers that evaluate subscriptions with a fixed delay shift every
    /// tick by the same amount, which keeps successive ticks contiguous.
    #[must_use]
    pub fn time_shift(&self, delta: Duration) -> Self {
        Self {
            offsets: self.offsets,
            timestamps: self.timestamps.shifted(delta),
        }
    }

    /// Returns the wall-clock span covered by the tick.
    #[must_use]
    pub fn duration(&self) -> Duration {
        *self.timestamps.upper() - *self.timestamps.lower()
    }
}

/// A tick as delivered by the broker, tagged with its source partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMessage {
    /// Partition of the commit log the tick was derived from.
    pub partition: PartitionId,
    /// Offset of this message on the tick topic.
    pub offset: u64,
    /// The tick itself.
    pub payload: Tick,
    /// Broker timestamp of the message.
    pub timestamp: DateTime<Utc>,
}

impl TickMessage {
    /// Creates a tick message.
    #[must_use]
    pub const fn new(
        partition: PartitionId,
        offset: u64,
        payload: Tick,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            partition,
            offset,
            payload,
            timestamp,
        }
    }
}

/// Returns the evaluation timestamps due in `timestamps` for `resolution`.
///
/// A timestamp `t` is due when it is a whole multiple of `resolution` since the
/// Unix epoch and `lower < t <= upper`. A zero resolution yields exactly one
/// timestamp, the interval's upper bound. Results are ascending.
#[must_use]
pub fn aligned_timestamps(
    timestamps: &Interval<DateTime<Utc>>,
    resolution: Duration,
) -> Vec<DateTime<Utc>> {
    let step = resolution.num_milliseconds();
    if step <= 0 {
        return vec![*timestamps.upper()];
    }

    let lower = timestamps.lower().timestamp_millis();
    let upper = timestamps.upper().timestamp_millis();

    let first = (lower.div_euclid(step) + 1) * step;
    let last = upper.div_euclid(step) * step;

    let mut due = Vec::new();
    let mut current = first;
    while current <= last {
        if let Some(timestamp) = DateTime::from_timestamp_millis(current) {
            due.push(timestamp);
        }
        current += step;
    }
    due
}
