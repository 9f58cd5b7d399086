use std::{sync::Arc, time::Duration};

use spectator_util::percentile_buckets::MAX_VALUE;

use crate::{
    id::Id,
    percentile::{BuildError, PercentileCounters, TIMER_LABELS},
    registry::Registry,
    timer::{duration_to_nanos, Timer},
};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const DEFAULT_MIN: i64 = 10 * NANOS_PER_MILLI;
const DEFAULT_MAX: i64 = 60 * NANOS_PER_SECOND;

/// A timer that also tracks the distribution of its durations, so percentiles can be estimated.
///
/// Every recorded duration is counted in one of 276 buckets, each backed by a counter registered
/// under the timer's identity with the tags `statistic=percentile` and `percentile=T<index>`.  The
/// distribution can then be aggregated across any dimension on the backend.
///
/// **Percentile timers are expensive compared to plain timers.**  In the worst case a single
/// identity creates a counter for every bucket.  Keep the cardinality of extra dimensions small and
/// set a range whenever possible: durations are clamped into the range before being bucketed, which
/// bounds the number of buckets that can ever be used.  The [builder](PercentileTimer::builder)
/// defaults to a range of 10 milliseconds to 1 minute.
///
/// The timer keeps handles to its counters.  After [`Registry::clear`] it keeps recording into
/// them, but they are no longer published; create a new `PercentileTimer` to report again.
pub struct PercentileTimer {
    id: Id,
    timer: Arc<Timer>,
    counters: PercentileCounters,
}

impl PercentileTimer {
    /// Creates a percentile timer covering every possible duration.
    pub fn new(registry: &Arc<Registry>, id: Id) -> Self {
        let timer = registry.timer_with_id(&id);
        let counters = PercentileCounters::full_range(Arc::clone(registry), &id, &TIMER_LABELS);
        Self { id, timer, counters }
    }

    /// Creates a percentile timer that clamps durations to `[min, max]`.
    ///
    /// # Errors
    ///
    /// Fails if `min` is greater than `max`.
    pub fn with_range(
        registry: &Arc<Registry>,
        id: Id,
        min: Duration,
        max: Duration,
    ) -> Result<Self, BuildError> {
        Self::with_range_nanos(registry, id, duration_to_nanos(min), duration_to_nanos(max))
    }

    /// Creates a percentile timer that clamps durations to `[min, max]` nanoseconds.
    ///
    /// # Errors
    ///
    /// Fails if `min` is negative or greater than `max`.
    pub fn with_range_nanos(
        registry: &Arc<Registry>,
        id: Id,
        min: i64,
        max: i64,
    ) -> Result<Self, BuildError> {
        let counters = PercentileCounters::new(Arc::clone(registry), &id, &TIMER_LABELS, min, max)?;
        let timer = registry.timer_with_id(&id);
        Ok(Self { id, timer, counters })
    }

    /// Creates a builder for a percentile timer.
    pub fn builder(registry: &Arc<Registry>) -> PercentileTimerBuilder {
        PercentileTimerBuilder::new(Arc::clone(registry))
    }

    /// Identity of the timer.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Range durations are clamped to, in nanoseconds.
    pub fn range(&self) -> (i64, i64) {
        self.counters.range()
    }

    /// Records a duration.
    pub fn record(&self, duration: Duration) {
        self.record_nanos(duration_to_nanos(duration));
    }

    /// Records a duration given in nanoseconds.  Negative durations are dropped.
    pub fn record_nanos(&self, nanos: i64) {
        if nanos >= 0 {
            self.timer.record_nanos(nanos);
            self.counters.record(nanos);
        }
    }

    /// Runs `f` and records how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let clock = self.counters.registry().config().clock();
        let start = clock.now();
        let result = f();
        self.record(clock.now().duration_since(start));
        result
    }

    /// Estimates the `p`th percentile of the recorded durations, in seconds.
    ///
    /// Returns `NaN` if nothing was recorded.  The underlying counters are read without being
    /// reset, so the result only changes when new durations are recorded or the counters are
    /// published.
    pub fn percentile(&self, p: f64) -> f64 {
        self.percentiles(&[p])[0]
    }

    /// Estimates several percentiles at once, in seconds.  `pcts` must be sorted ascending.
    pub fn percentiles(&self, pcts: &[f64]) -> Vec<f64> {
        let mut results = self.counters.percentiles(pcts);
        for result in &mut results {
            *result /= NANOS_PER_SECOND as f64;
        }
        results
    }

    /// Number of recorded durations, as seen by the underlying timer.
    pub fn count(&self) -> u64 {
        self.timer.count()
    }

    /// Total recorded time in nanoseconds, as seen by the underlying timer.
    pub fn total_time(&self) -> i64 {
        self.timer.total_time()
    }
}

/// Builder for a [`PercentileTimer`].
pub struct PercentileTimerBuilder {
    registry: Arc<Registry>,
    id: Option<Id>,
    name: Option<String>,
    tags: Vec<(String, String)>,
    min: i64,
    max: i64,
}

impl PercentileTimerBuilder {
    fn new(registry: Arc<Registry>) -> Self {
        Self { registry, id: None, name: None, tags: Vec::new(), min: DEFAULT_MIN, max: DEFAULT_MAX }
    }

    /// Sets the identity of the timer.  Takes precedence over the name and tags.
    #[must_use]
    pub fn with_id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the name of the timer.
    #[must_use]
    pub fn with_name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds tags to the timer.
    #[must_use]
    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the range durations are clamped to.
    ///
    /// Defaults to 10 milliseconds to 1 minute.
    #[must_use]
    pub fn with_range(mut self, min: Duration, max: Duration) -> Self {
        self.min = duration_to_nanos(min);
        self.max = duration_to_nanos(max);
        self
    }

    /// Sets the range in seconds.
    #[must_use]
    pub fn with_range_seconds(mut self, min: i64, max: i64) -> Self {
        self.min = min.saturating_mul(NANOS_PER_SECOND);
        self.max = max.saturating_mul(NANOS_PER_SECOND);
        self
    }

    /// Sets the range in milliseconds.
    #[must_use]
    pub fn with_range_millis(mut self, min: i64, max: i64) -> Self {
        self.min = min.saturating_mul(NANOS_PER_MILLI);
        self.max = max.saturating_mul(NANOS_PER_MILLI);
        self
    }

    /// Sets the range in nanoseconds.
    #[must_use]
    pub fn with_range_nanos(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Removes the range, so every possible duration gets its own bucket.
    #[must_use]
    pub fn with_full_range(mut self) -> Self {
        self.min = 0;
        self.max = MAX_VALUE;
        self
    }

    /// Builds the timer.
    ///
    /// # Errors
    ///
    /// Fails if neither an identity nor a name was set, or if the range is invalid.
    pub fn build(self) -> Result<PercentileTimer, BuildError> {
        let id = match (self.id, self.name) {
            (Some(id), _) => id,
            (None, Some(name)) => self.registry.new_id(name, self.tags),
            (None, None) => return Err(BuildError::MissingName),
        };
        PercentileTimer::with_range_nanos(&self.registry, id, self.min, self.max)
    }
}
