use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
};

fn nan_bits() -> u64 {
    f64::NAN.to_bits()
}

/// Reports the last value it was set to.
///
/// A gauge starts out unset (`NaN`) and returns to that state after each measurement, so a value
/// is only published once.  With a time to live, the agent keeps reporting the published value for
/// that long instead of its default.
#[derive(Debug)]
pub struct Gauge {
    id: Id,
    gauge_id: Id,
    value: AtomicU64,
    // Whole seconds, zero when unset.
    ttl_secs: AtomicU64,
}

impl Gauge {
    /// Creates a new `Gauge`.
    pub fn new(id: Id) -> Self {
        let gauge_id = id.with_default_stat(Statistic::Gauge);
        Self { id, gauge_id, value: AtomicU64::new(nan_bits()), ttl_secs: AtomicU64::new(0) }
    }

    /// Creates a new `Gauge` whose values live for `ttl` on the agent.
    pub fn with_ttl(id: Id, ttl: Duration) -> Self {
        let gauge = Self::new(id);
        gauge.set_ttl(ttl);
        gauge
    }

    /// Sets the time to live of published values, truncated to whole seconds.
    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_secs.store(ttl.as_secs(), Ordering::Relaxed);
    }

    /// Time to live of published values, if one was set.
    pub fn ttl(&self) -> Option<Duration> {
        match self.ttl_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Identity of the gauge.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Sets the current value.
    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Release);
    }

    /// Current value, or `NaN` if unset.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Takes the current value, leaving the gauge unset.
    pub fn measure(&self) -> Vec<Measurement> {
        let value = f64::from_bits(self.value.swap(nan_bits(), Ordering::AcqRel));
        if value.is_nan() {
            Vec::new()
        } else {
            vec![Measurement::new(self.gauge_id.clone(), value).with_ttl(self.ttl())]
        }
    }
}

/// Reports the largest value seen since the last measurement.
#[derive(Debug)]
pub struct MaxGauge {
    id: Id,
    max_id: Id,
    value: AtomicU64,
}

impl MaxGauge {
    /// Creates a new `MaxGauge`.
    pub fn new(id: Id) -> Self {
        let max_id = id.with_default_stat(Statistic::Max);
        Self { id, max_id, value: AtomicU64::new(nan_bits()) }
    }

    /// Identity of the gauge.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Raises the current value to `value` if it is larger.  `NaN` is ignored.
    pub fn update(&self, value: f64) {
        if value.is_nan() {
            return;
        }

        let _ = self.value.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |curr| {
            let current = f64::from_bits(curr);
            (current.is_nan() || value > current).then(|| value.to_bits())
        });
    }

    /// Current maximum, or `NaN` if nothing was recorded.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Takes the current maximum, leaving the gauge unset.
    pub fn measure(&self) -> Vec<Measurement> {
        let value = f64::from_bits(self.value.swap(nan_bits(), Ordering::AcqRel));
        if value.is_nan() {
            Vec::new()
        } else {
            vec![Measurement::new(self.max_id.clone(), value)]
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Gauge, MaxGauge};
    use crate::id::Id;

    #[test]
    fn gauge_reports_last_value_once() {
        let gauge = Gauge::new(Id::from_name("g"));
        assert!(gauge.get().is_nan());
        assert!(gauge.measure().is_empty());

        gauge.set(3.0);
        gauge.set(1.5);
        assert_eq!(gauge.get(), 1.5);

        let ms = gauge.measure();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].id().tag("statistic"), Some("gauge"));
        assert_eq!(ms[0].value(), 1.5);
        assert!(gauge.measure().is_empty());
    }

    #[test]
    fn ttl_is_attached_to_measurements() {
        let gauge = Gauge::with_ttl(Id::from_name("g"), Duration::from_secs(120));
        assert_eq!(gauge.ttl(), Some(Duration::from_secs(120)));

        gauge.set(4.0);
        let ms = gauge.measure();
        assert_eq!(ms[0].ttl(), Some(Duration::from_secs(120)));

        let plain = Gauge::new(Id::from_name("p"));
        plain.set(1.0);
        assert_eq!(plain.measure()[0].ttl(), None);
    }

    #[test]
    fn max_gauge_keeps_largest() {
        let gauge = MaxGauge::new(Id::from_name("mg"));
        gauge.update(2.0);
        gauge.update(7.0);
        gauge.update(f64::NAN);
        gauge.update(-1.0);
        assert_eq!(gauge.get(), 7.0);

        let ms = gauge.measure();
        assert_eq!(ms[0].id().tag("statistic"), Some("max"));
        assert_eq!(ms[0].value(), 7.0);
        assert!(gauge.measure().is_empty());

        gauge.update(-4.0);
        assert_eq!(gauge.get(), -4.0);
    }
}
