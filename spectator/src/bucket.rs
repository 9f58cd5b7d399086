//! Meters that split their values across a small set of labeled buckets.
//!
//! Each bucket meter classifies a value with a [`BucketFn`] and forwards it to a sub-meter
//! registered under the meter's identity plus a `bucket=<label>` tag.  Sub-meters only exist for
//! the buckets that have actually been used.

use std::{fmt, sync::Arc, time::Duration};

use spectator_util::BucketFn;

use crate::{
    counter::Counter,
    dist_summary::DistributionSummary,
    id::Id,
    registry::Registry,
    timer::{duration_to_nanos, Timer},
};

/// Tag key holding the bucket label of a sub-meter.
pub const BUCKET_TAG: &str = "bucket";

struct Buckets {
    registry: Arc<Registry>,
    id: Id,
    f: Box<dyn BucketFn>,
}

impl Buckets {
    fn new<F: BucketFn + 'static>(registry: &Arc<Registry>, id: Id, f: F) -> Self {
        Self { registry: Arc::clone(registry), id, f: Box::new(f) }
    }

    fn sub_id(&self, amount: i64) -> Id {
        self.id.with_tag(BUCKET_TAG, self.f.bucket(amount))
    }
}

impl fmt::Debug for Buckets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buckets").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Counts events per bucket of an associated amount.
///
/// ```
/// # use std::sync::Arc;
/// # use spectator::{BucketCounter, Id, Registry};
/// use spectator_util::bucket_functions::{bytes, BucketError};
///
/// # fn main() -> Result<(), BucketError> {
/// let registry = Arc::new(Registry::default());
/// let uploads = BucketCounter::new(&registry, Id::from_name("uploads"), bytes(1024 * 1024)?);
/// uploads.record(300_000);
/// assert_eq!(registry.meters()[0].id().tag("bucket"), Some("0512_KiB"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BucketCounter {
    buckets: Buckets,
}

impl BucketCounter {
    /// Creates a new `BucketCounter` classifying amounts with `f`.
    pub fn new<F: BucketFn + 'static>(registry: &Arc<Registry>, id: Id, f: F) -> Self {
        Self { buckets: Buckets::new(registry, id, f) }
    }

    /// Identity of the counter, without the bucket tag.
    pub fn id(&self) -> &Id {
        &self.buckets.id
    }

    /// Counts one event in the bucket of `amount`.
    pub fn record(&self, amount: i64) {
        self.increment(amount, 1);
    }

    /// Counts `n` events in the bucket of `amount`.
    pub fn increment(&self, amount: i64, n: u64) {
        self.counter(amount).add(n);
    }

    /// Returns the sub-counter for the bucket of `amount`.
    pub fn counter(&self, amount: i64) -> Arc<Counter> {
        self.buckets.registry.counter_with_id(&self.buckets.sub_id(amount))
    }
}

/// Times events per bucket of their duration.
#[derive(Debug)]
pub struct BucketTimer {
    buckets: Buckets,
}

impl BucketTimer {
    /// Creates a new `BucketTimer` classifying nanosecond durations with `f`.
    pub fn new<F: BucketFn + 'static>(registry: &Arc<Registry>, id: Id, f: F) -> Self {
        Self { buckets: Buckets::new(registry, id, f) }
    }

    /// Identity of the timer, without the bucket tag.
    pub fn id(&self) -> &Id {
        &self.buckets.id
    }

    /// Records a duration.
    pub fn record(&self, duration: Duration) {
        self.record_nanos(duration_to_nanos(duration));
    }

    /// Records a duration given in nanoseconds.
    pub fn record_nanos(&self, nanos: i64) {
        self.timer(nanos).record_nanos(nanos);
    }

    /// Runs `f` and records how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let clock = self.buckets.registry.config().clock();
        let start = clock.now();
        let result = f();
        self.record(clock.now().duration_since(start));
        result
    }

    /// Returns the sub-timer for the bucket of `nanos`.
    pub fn timer(&self, nanos: i64) -> Arc<Timer> {
        self.buckets.registry.timer_with_id(&self.buckets.sub_id(nanos))
    }
}

/// Summarizes amounts per bucket.
#[derive(Debug)]
pub struct BucketDistributionSummary {
    buckets: Buckets,
}

impl BucketDistributionSummary {
    /// Creates a new `BucketDistributionSummary` classifying amounts with `f`.
    pub fn new<F: BucketFn + 'static>(registry: &Arc<Registry>, id: Id, f: F) -> Self {
        Self { buckets: Buckets::new(registry, id, f) }
    }

    /// Identity of the summary, without the bucket tag.
    pub fn id(&self) -> &Id {
        &self.buckets.id
    }

    /// Records an amount.
    pub fn record(&self, amount: i64) {
        self.summary(amount).record(amount);
    }

    /// Returns the sub-summary for the bucket of `amount`.
    pub fn summary(&self, amount: i64) -> Arc<DistributionSummary> {
        self.buckets.registry.distribution_summary_with_id(&self.buckets.sub_id(amount))
    }
}
