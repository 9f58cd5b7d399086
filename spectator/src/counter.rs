use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
};

/// Counts events.
///
/// Reading a counter through [`measure`](Counter::measure) resets it, so each published value is
/// the number of events since the previous publish.
#[derive(Debug)]
pub struct Counter {
    id: Id,
    count_id: Id,
    count: AtomicU64,
}

impl Counter {
    /// Creates a new `Counter`.
    pub fn new(id: Id) -> Self {
        let count_id = id.with_default_stat(Statistic::Count);
        Self { id, count_id, count: AtomicU64::new(0) }
    }

    /// Identity of the counter.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Adds one to the counter.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Adds `n` to the counter.
    pub fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Current count, without resetting it.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Takes the current count, resetting it to zero.
    ///
    /// Nothing is reported while the count is zero.
    pub fn measure(&self) -> Vec<Measurement> {
        match self.count.swap(0, Ordering::Relaxed) {
            0 => Vec::new(),
            count => vec![Measurement::new(self.count_id.clone(), count as f64)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Counter;
    use crate::id::Id;

    #[test]
    fn increment_and_measure() {
        let counter = Counter::new(Id::from_name("c"));
        assert!(counter.measure().is_empty());

        counter.increment();
        counter.add(4);
        assert_eq!(counter.count(), 5);

        let ms = counter.measure();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].id().tag("statistic"), Some("count"));
        assert_eq!(ms[0].value(), 5.0);

        assert_eq!(counter.count(), 0);
        assert!(counter.measure().is_empty());
    }

    #[test]
    fn explicit_statistic_is_kept() {
        let counter = Counter::new(Id::new("c", [("statistic", "percentile")]));
        counter.increment();
        assert_eq!(counter.measure()[0].id().tag("statistic"), Some("percentile"));
    }
}
