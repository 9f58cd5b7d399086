use std::{fmt, time::Duration};

use crate::id::{Id, STATISTIC_TAG};

/// The statistic a measurement reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Statistic {
    /// Number of events.
    Count,
    /// Sum of recorded amounts.
    TotalAmount,
    /// Sum of recorded durations, in seconds.
    TotalTime,
    /// Sum of the squares of recorded values.
    TotalOfSquares,
    /// Largest recorded value.
    Max,
    /// Last sampled value.
    Gauge,
    /// Count of a percentile bucket.
    Percentile,
    /// Number of tasks currently running.
    ActiveTasks,
    /// Elapsed time, in seconds, of running tasks or since the last update.
    Duration,
}

impl Statistic {
    /// Returns the tag value for this statistic.
    pub const fn as_str(self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::TotalAmount => "totalAmount",
            Statistic::TotalTime => "totalTime",
            Statistic::TotalOfSquares => "totalOfSquares",
            Statistic::Max => "max",
            Statistic::Gauge => "gauge",
            Statistic::Percentile => "percentile",
            Statistic::ActiveTasks => "activeTasks",
            Statistic::Duration => "duration",
        }
    }

    /// Parses a statistic from its tag value.
    pub fn from_tag(value: &str) -> Option<Self> {
        let statistic = match value {
            "count" => Statistic::Count,
            "totalAmount" => Statistic::TotalAmount,
            "totalTime" => Statistic::TotalTime,
            "totalOfSquares" => Statistic::TotalOfSquares,
            "max" => Statistic::Max,
            "gauge" => Statistic::Gauge,
            "percentile" => Statistic::Percentile,
            "activeTasks" => Statistic::ActiveTasks,
            "duration" => Statistic::Duration,
            _ => return None,
        };
        Some(statistic)
    }

    /// Returns how values of this statistic combine on the backend.
    pub const fn op(self) -> Op {
        match self {
            Statistic::Max | Statistic::Gauge | Statistic::ActiveTasks | Statistic::Duration => Op::Max,
            _ => Op::Add,
        }
    }

    /// Returns `true` for statistics sampled at a point in time rather than accumulated.
    pub const fn is_gauge(self) -> bool {
        matches!(self, Statistic::Gauge | Statistic::ActiveTasks | Statistic::Duration)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a value combines with other values for the same identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// Values are summed.
    Add,
    /// The largest value wins.
    Max,
    /// The identity carries no known statistic.
    Unknown,
}

/// A single value sampled from a meter.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    id: Id,
    value: f64,
    ttl: Option<Duration>,
}

impl Measurement {
    /// Creates a new `Measurement`.
    pub fn new(id: Id, value: f64) -> Self {
        Self { id, value, ttl: None }
    }

    /// Sets how long the agent keeps reporting this value after it is received.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Identity of the measurement, including its `statistic` tag.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Sampled value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Time to live requested for a gauge value, if any.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the statistic named by the `statistic` tag, if it is a known one.
    pub fn statistic(&self) -> Option<Statistic> {
        self.id.tag(STATISTIC_TAG).and_then(Statistic::from_tag)
    }

    /// Returns how this measurement combines with others for the same identity.
    pub fn op(&self) -> Op {
        self.statistic().map_or(Op::Unknown, Statistic::op)
    }

    /// Returns `true` if this measurement carries information worth publishing.
    ///
    /// Additive values are only sent when positive, and maximums whenever they are a number.
    pub fn should_send(&self) -> bool {
        match self.op() {
            Op::Add => self.value > 0.0,
            Op::Max => !self.value.is_nan(),
            Op::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Measurement, Op, Statistic};
    use crate::id::Id;

    fn measurement(stat: &str, value: f64) -> Measurement {
        Measurement::new(Id::new("m", [("statistic", stat)]), value)
    }

    #[test]
    fn statistic_round_trips_through_tag() {
        for stat in [
            Statistic::Count,
            Statistic::TotalAmount,
            Statistic::TotalTime,
            Statistic::TotalOfSquares,
            Statistic::Max,
            Statistic::Gauge,
            Statistic::Percentile,
            Statistic::ActiveTasks,
            Statistic::Duration,
        ] {
            assert_eq!(Statistic::from_tag(stat.as_str()), Some(stat));
        }
        assert_eq!(Statistic::from_tag("bogus"), None);
    }

    #[test]
    fn op_follows_statistic() {
        assert_eq!(measurement("count", 1.0).op(), Op::Add);
        assert_eq!(measurement("percentile", 1.0).op(), Op::Add);
        assert_eq!(measurement("totalTime", 1.0).op(), Op::Add);
        assert_eq!(measurement("max", 1.0).op(), Op::Max);
        assert_eq!(measurement("gauge", 1.0).op(), Op::Max);
        assert_eq!(measurement("activeTasks", 1.0).op(), Op::Max);
        assert_eq!(measurement("duration", 1.0).op(), Op::Max);
        assert_eq!(measurement("bogus", 1.0).op(), Op::Unknown);
        assert_eq!(Measurement::new(Id::from_name("m"), 1.0).op(), Op::Unknown);
    }

    #[test]
    fn should_send() {
        assert!(measurement("count", 1.0).should_send());
        assert!(!measurement("count", 0.0).should_send());
        assert!(!measurement("count", -1.0).should_send());
        assert!(measurement("gauge", 0.0).should_send());
        assert!(measurement("max", -3.0).should_send());
        assert!(!measurement("gauge", f64::NAN).should_send());
        assert!(!measurement("bogus", 10.0).should_send());
    }
}
