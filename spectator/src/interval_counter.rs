use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use quanta::{Clock, Instant};

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
};

/// A counter that also tracks the time since it was last updated.
///
/// Measurements report the count since the previous publish (`statistic=count`) and the seconds
/// since the last update (`statistic=duration`).  The duration is not reported until the counter
/// has been updated once.
pub struct IntervalCounter {
    id: Id,
    count_id: Id,
    duration_id: Id,
    count: AtomicU64,
    last_updated: Mutex<Option<Instant>>,
    clock: Clock,
}

impl IntervalCounter {
    /// Creates a new `IntervalCounter`.
    pub fn new(id: Id) -> Self {
        Self::with_clock(id, Clock::new())
    }

    /// Creates a new `IntervalCounter` that reads elapsed time from `clock`.
    pub fn with_clock(id: Id, clock: Clock) -> Self {
        let count_id = id.with_stat(Statistic::Count);
        let duration_id = id.with_stat(Statistic::Duration);
        Self { id, count_id, duration_id, count: AtomicU64::new(0), last_updated: Mutex::new(None), clock }
    }

    /// Identity of the counter.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Adds one to the counter.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Adds `n` to the counter and marks it as updated.
    pub fn add(&self, n: u64) {
        *self.last_updated.lock() = Some(self.clock.now());
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Current count, without resetting it.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Seconds since the last update, or `None` if the counter was never updated.
    pub fn seconds_since_last_update(&self) -> Option<f64> {
        let last = (*self.last_updated.lock())?;
        Some(self.clock.now().duration_since(last).as_secs_f64())
    }

    /// Takes the current count, resetting it, along with the time since the last update.
    pub fn measure(&self) -> Vec<Measurement> {
        let mut ms = Vec::with_capacity(2);
        match self.count.swap(0, Ordering::Relaxed) {
            0 => {}
            count => ms.push(Measurement::new(self.count_id.clone(), count as f64)),
        }
        if let Some(seconds) = self.seconds_since_last_update() {
            ms.push(Measurement::new(self.duration_id.clone(), seconds));
        }
        ms
    }
}

impl fmt::Debug for IntervalCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalCounter")
            .field("id", &self.id)
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}
