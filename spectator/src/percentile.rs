use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use spectator_util::percentile_buckets::{self, LENGTH, MAX_VALUE};
use thiserror::Error;

use crate::{counter::Counter, id::Id, measurement::Statistic, registry::Registry};

/// Tag key holding the bucket index of a percentile counter.
pub const PERCENTILE_TAG: &str = "percentile";

fn bucket_labels(prefix: char) -> Vec<String> {
    (0..LENGTH).map(|i| format!("{}{:04x}", prefix, i)).collect()
}

pub(crate) static TIMER_LABELS: Lazy<Vec<String>> = Lazy::new(|| bucket_labels('T'));
pub(crate) static SUMMARY_LABELS: Lazy<Vec<String>> = Lazy::new(|| bucket_labels('D'));

/// Errors that could occur while building a percentile or polled meter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The lower end of the range was negative.
    #[error("minimum of the range must not be negative (got {min})")]
    NegativeMinimum {
        /// The rejected minimum.
        min: i64,
    },

    /// The lower end of the range was above the upper end.
    #[error("minimum of the range ({min}) is greater than its maximum ({max})")]
    InvertedRange {
        /// The rejected minimum.
        min: i64,

        /// The rejected maximum.
        max: i64,
    },

    /// Neither an identity nor a name was given to the builder.
    #[error("a name or an identity is required")]
    MissingName,
}

/// Lazily created per-bucket counters of a percentile meter.
pub(crate) struct PercentileCounters {
    registry: Arc<Registry>,
    base: Id,
    labels: &'static [String],
    slots: Box<[OnceCell<Arc<Counter>>]>,
    min: i64,
    max: i64,
}

impl PercentileCounters {
    pub fn new(
        registry: Arc<Registry>,
        id: &Id,
        labels: &'static [String],
        min: i64,
        max: i64,
    ) -> Result<Self, BuildError> {
        if min < 0 {
            return Err(BuildError::NegativeMinimum { min });
        }
        if min > max {
            return Err(BuildError::InvertedRange { min, max });
        }

        Ok(Self::with_bounds(registry, id, labels, min, max))
    }

    pub fn full_range(registry: Arc<Registry>, id: &Id, labels: &'static [String]) -> Self {
        Self::with_bounds(registry, id, labels, 0, MAX_VALUE)
    }

    fn with_bounds(registry: Arc<Registry>, id: &Id, labels: &'static [String], min: i64, max: i64) -> Self {
        let slots = (0..LENGTH).map(|_| OnceCell::new()).collect();
        let base = id.with_stat(Statistic::Percentile);
        Self { registry, base, labels, slots, min, max }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn counter(&self, idx: usize) -> &Arc<Counter> {
        self.slots[idx].get_or_init(|| {
            let id = self.base.with_tag(PERCENTILE_TAG, self.labels[idx].as_str());
            self.registry.counter_with_id(&id)
        })
    }

    /// Counts `amount`, which must not be negative, in the bucket of its clamped value.
    pub fn record(&self, amount: i64) {
        let clamped = amount.clamp(self.min, self.max);
        self.counter(percentile_buckets::index_of(clamped)).increment();
    }

    /// Current per-bucket counts.  Buckets that were never used count as zero.
    pub fn counts(&self) -> Vec<u64> {
        self.slots.iter().map(|slot| slot.get().map_or(0, |counter| counter.count())).collect()
    }

    pub fn percentiles(&self, pcts: &[f64]) -> Vec<f64> {
        let counts = self.counts();
        let mut results = vec![f64::NAN; pcts.len()];
        percentile_buckets::percentiles(&counts, pcts, &mut results);
        results
    }

    pub fn range(&self) -> (i64, i64) {
        (self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spectator_util::percentile_buckets::{LENGTH, MAX_VALUE};

    use super::{BuildError, PercentileCounters, SUMMARY_LABELS, TIMER_LABELS};
    use crate::{id::Id, registry::Registry};

    #[test]
    fn labels_are_fixed_width_hex() {
        assert_eq!(TIMER_LABELS.len(), 276);
        assert_eq!(TIMER_LABELS[0], "T0000");
        assert_eq!(TIMER_LABELS[42], "T002a");
        assert_eq!(SUMMARY_LABELS[275], "D0113");
    }

    #[test]
    fn range_validation() {
        let registry = Arc::new(Registry::default());
        let id = Id::from_name("p");
        assert_eq!(
            PercentileCounters::new(Arc::clone(&registry), &id, &TIMER_LABELS, -1, 10).err(),
            Some(BuildError::NegativeMinimum { min: -1 })
        );
        assert_eq!(
            PercentileCounters::new(Arc::clone(&registry), &id, &TIMER_LABELS, 10, 5).err(),
            Some(BuildError::InvertedRange { min: 10, max: 5 })
        );
        assert!(PercentileCounters::new(registry, &id, &TIMER_LABELS, 5, 5).is_ok());
    }

    #[test]
    fn counters_are_created_lazily_and_clamped() {
        let registry = Arc::new(Registry::default());
        let counters =
            PercentileCounters::new(Arc::clone(&registry), &Id::from_name("p"), &TIMER_LABELS, 100, 1_000)
                .unwrap();
        assert!(registry.is_empty());

        counters.record(0);
        counters.record(50);
        counters.record(5_000);
        assert_eq!(registry.len(), 2);

        let counts = counters.counts();
        assert_eq!(counts[spectator_util::percentile_buckets::index_of(100)], 2);
        assert_eq!(counts[spectator_util::percentile_buckets::index_of(1_000)], 1);

        let ids: Vec<_> = registry.meters().iter().map(|m| m.id().to_string()).collect();
        assert!(ids.iter().all(|id| id.starts_with("p,percentile=T") && id.ends_with(",statistic=percentile")));
    }

    #[test]
    fn full_range_matches_unbounded_new() {
        let registry = Arc::new(Registry::default());
        let id = Id::from_name("p");
        let full = PercentileCounters::full_range(Arc::clone(&registry), &id, &SUMMARY_LABELS);
        let built = PercentileCounters::new(Arc::clone(&registry), &id, &SUMMARY_LABELS, 0, MAX_VALUE).unwrap();
        assert_eq!(full.range(), built.range());

        full.record(i64::MAX);
        assert_eq!(built.counts()[LENGTH - 1], 0);
        assert_eq!(full.counts()[LENGTH - 1], 1);
        assert_eq!(registry.meters()[0].id().tag("percentile"), Some("D0113"));
    }
}
