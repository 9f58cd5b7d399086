use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
};

fn epoch_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0.0, |d| d.as_secs_f64())
}

/// Reports the seconds elapsed since an event last happened.
///
/// Once set, every measurement reports the age of the latest event, which makes it easy to alert
/// on the time since the last success.  Nothing is reported before the first event.
#[derive(Debug)]
pub struct AgeGauge {
    id: Id,
    gauge_id: Id,
    // Epoch seconds as f64 bits, NaN while unset.
    last: AtomicU64,
}

impl AgeGauge {
    /// Creates a new `AgeGauge`.
    pub fn new(id: Id) -> Self {
        let gauge_id = id.with_default_stat(Statistic::Gauge);
        Self { id, gauge_id, last: AtomicU64::new(f64::NAN.to_bits()) }
    }

    /// Identity of the gauge.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Records an event that happened `seconds` after the epoch, or now if it is zero.
    pub fn set(&self, seconds: f64) {
        let at = if seconds == 0.0 { epoch_seconds() } else { seconds };
        self.last.store(at.to_bits(), Ordering::Relaxed);
    }

    /// Records an event that happened now.
    pub fn now(&self) {
        self.set(0.0);
    }

    /// Time of the latest event in epoch seconds, if any.
    pub fn last(&self) -> Option<f64> {
        let last = f64::from_bits(self.last.load(Ordering::Relaxed));
        (!last.is_nan()).then_some(last)
    }

    /// Reports the age of the latest event, without resetting it.
    pub fn measure(&self) -> Vec<Measurement> {
        match self.last() {
            Some(last) => vec![Measurement::new(self.gauge_id.clone(), (epoch_seconds() - last).max(0.0))],
            None => Vec::new(),
        }
    }
}
