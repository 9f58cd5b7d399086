use std::{fmt, time::Duration};

use parking_lot::Mutex;
use quanta::Clock;

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
    stats::{StatIds, Stats},
};

const NANOS_PER_SECOND: f64 = 1e9;

/// Converts a duration to whole nanoseconds, saturating at `i64::MAX`.
pub(crate) fn duration_to_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// Measures how long events take.
///
/// Durations are kept in nanoseconds and reported in seconds: the number of events, the total
/// time, the total of squares and the maximum, all reset when measured.
pub struct Timer {
    id: Id,
    ids: StatIds,
    stats: Mutex<Stats>,
    clock: Clock,
}

impl Timer {
    /// Creates a new `Timer`.
    pub fn new(id: Id) -> Self {
        Self::with_clock(id, Clock::new())
    }

    /// Creates a new `Timer` that uses `clock` for [`time`](Timer::time).
    pub fn with_clock(id: Id, clock: Clock) -> Self {
        let ids = StatIds::new(&id, Statistic::TotalTime);
        Self { id, ids, stats: Mutex::new(Stats::default()), clock }
    }

    /// Identity of the timer.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Records a duration.
    pub fn record(&self, duration: Duration) {
        self.record_nanos(duration_to_nanos(duration));
    }

    /// Records a duration given in nanoseconds.
    ///
    /// Negative durations are dropped.
    pub fn record_nanos(&self, nanos: i64) {
        if nanos >= 0 {
            self.stats.lock().record(nanos);
        }
    }

    /// Runs `f` and records how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = self.clock.now();
        let result = f();
        self.record(self.clock.now().duration_since(start));
        result
    }

    /// Number of recorded events since the last measurement.
    pub fn count(&self) -> u64 {
        self.stats.lock().count
    }

    /// Total recorded time since the last measurement, in nanoseconds.
    pub fn total_time(&self) -> i64 {
        self.stats.lock().total
    }

    /// Takes the current statistics, resetting them.
    pub fn measure(&self) -> Vec<Measurement> {
        let stats = self.stats.lock().take();
        self.ids.measure(stats, NANOS_PER_SECOND)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("id", &self.id).field("stats", &self.stats).finish_non_exhaustive()
    }
}
