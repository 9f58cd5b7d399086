use parking_lot::Mutex;

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
};

/// Last sample of a monotonic source and the sample the previous measurement was taken against.
#[derive(Debug, Default)]
struct Samples<T> {
    current: Option<T>,
    baseline: Option<T>,
}

impl<T: Copy + PartialOrd> Samples<T> {
    /// Moves the baseline to the current sample, returning the growth in between.
    ///
    /// A sample below the baseline means the source was reset and only moves the baseline.
    fn advance(&mut self) -> Option<(T, T)> {
        let current = self.current?;
        let growth = match self.baseline {
            Some(baseline) if current >= baseline => Some((baseline, current)),
            _ => None,
        };
        self.baseline = Some(current);
        growth
    }
}

fn count_measurement(id: &Id, delta: f64) -> Vec<Measurement> {
    if delta > 0.0 {
        vec![Measurement::new(id.clone(), delta)]
    } else {
        Vec::new()
    }
}

/// Tracks a monotonically increasing number sampled from elsewhere, such as a kernel counter.
///
/// Each measurement reports the growth since the previous one as a count, so at least two
/// samples are needed before anything is reported.
#[derive(Debug)]
pub struct MonotonicCounter {
    id: Id,
    count_id: Id,
    samples: Mutex<Samples<f64>>,
}

impl MonotonicCounter {
    /// Creates a new `MonotonicCounter`.
    pub fn new(id: Id) -> Self {
        let count_id = id.with_default_stat(Statistic::Count);
        Self { id, count_id, samples: Mutex::new(Samples::default()) }
    }

    /// Identity of the counter.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Records the current value of the source.
    pub fn set(&self, value: f64) {
        if !value.is_nan() {
            self.samples.lock().current = Some(value);
        }
    }

    /// Latest recorded value.
    pub fn get(&self) -> Option<f64> {
        self.samples.lock().current
    }

    /// Reports the growth since the previous measurement.
    pub fn measure(&self) -> Vec<Measurement> {
        let delta = self.samples.lock().advance().map_or(0.0, |(from, to)| to - from);
        count_measurement(&self.count_id, delta)
    }
}

/// Same as [`MonotonicCounter`], for unsigned 64-bit sources such as byte counts.
#[derive(Debug)]
pub struct MonotonicCounterUint {
    id: Id,
    count_id: Id,
    samples: Mutex<Samples<u64>>,
}

impl MonotonicCounterUint {
    /// Creates a new `MonotonicCounterUint`.
    pub fn new(id: Id) -> Self {
        let count_id = id.with_default_stat(Statistic::Count);
        Self { id, count_id, samples: Mutex::new(Samples::default()) }
    }

    /// Identity of the counter.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Records the current value of the source.
    pub fn set(&self, value: u64) {
        self.samples.lock().current = Some(value);
    }

    /// Latest recorded value.
    pub fn get(&self) -> Option<u64> {
        self.samples.lock().current
    }

    /// Reports the growth since the previous measurement.
    pub fn measure(&self) -> Vec<Measurement> {
        let delta = self.samples.lock().advance().map_or(0, |(from, to)| to - from);
        count_measurement(&self.count_id, delta as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::{MonotonicCounter, MonotonicCounterUint};
    use crate::id::Id;

    #[test]
    fn needs_two_samples() {
        let counter = MonotonicCounter::new(Id::from_name("m"));
        assert!(counter.measure().is_empty());

        counter.set(10.0);
        assert!(counter.measure().is_empty());

        counter.set(12.5);
        let ms = counter.measure();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].id().tag("statistic"), Some("count"));
        assert_eq!(ms[0].value(), 2.5);

        // Unchanged source reports nothing.
        assert!(counter.measure().is_empty());
    }

    #[test]
    fn reset_source_rebaselines() {
        let counter = MonotonicCounterUint::new(Id::from_name("bytes"));
        counter.set(1_000);
        assert!(counter.measure().is_empty());

        counter.set(400);
        assert!(counter.measure().is_empty());

        counter.set(u64::MAX);
        assert_eq!(counter.measure()[0].value(), (u64::MAX - 400) as f64);
        assert_eq!(counter.get(), Some(u64::MAX));
    }

    #[test]
    fn only_latest_sample_counts() {
        let counter = MonotonicCounter::new(Id::from_name("m"));
        counter.set(1.0);
        counter.measure();
        counter.set(5.0);
        counter.set(3.0);
        assert_eq!(counter.measure()[0].value(), 2.0);
        counter.set(f64::NAN);
        assert_eq!(counter.get(), Some(3.0));
    }
}
