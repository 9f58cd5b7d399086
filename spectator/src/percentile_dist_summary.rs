use std::sync::Arc;

use spectator_util::percentile_buckets::MAX_VALUE;

use crate::{
    dist_summary::DistributionSummary,
    id::Id,
    percentile::{BuildError, PercentileCounters, SUMMARY_LABELS},
    registry::Registry,
};

/// A distribution summary that also tracks the distribution of its amounts, so percentiles can be
/// estimated.
///
/// Works like [`PercentileTimer`](crate::PercentileTimer), with bucket counters tagged
/// `percentile=D<index>`.  The same cost warning applies: set a range whenever the expected
/// amounts are known.
///
/// Like the timer, the summary keeps handles to its counters, which are no longer published after
/// [`Registry::clear`].
pub struct PercentileDistributionSummary {
    id: Id,
    summary: Arc<DistributionSummary>,
    counters: PercentileCounters,
}

impl PercentileDistributionSummary {
    /// Creates a percentile summary covering every possible amount.
    pub fn new(registry: &Arc<Registry>, id: Id) -> Self {
        let summary = registry.distribution_summary_with_id(&id);
        let counters = PercentileCounters::full_range(Arc::clone(registry), &id, &SUMMARY_LABELS);
        Self { id, summary, counters }
    }

    /// Creates a percentile summary that clamps amounts to `[min, max]`.
    ///
    /// # Errors
    ///
    /// Fails if `min` is negative or greater than `max`.
    pub fn with_range(registry: &Arc<Registry>, id: Id, min: i64, max: i64) -> Result<Self, BuildError> {
        let counters = PercentileCounters::new(Arc::clone(registry), &id, &SUMMARY_LABELS, min, max)?;
        let summary = registry.distribution_summary_with_id(&id);
        Ok(Self { id, summary, counters })
    }

    /// Creates a builder for a percentile summary.
    pub fn builder(registry: &Arc<Registry>) -> PercentileDistributionSummaryBuilder {
        PercentileDistributionSummaryBuilder {
            registry: Arc::clone(registry),
            id: None,
            name: None,
            tags: Vec::new(),
            min: 0,
            max: MAX_VALUE,
        }
    }

    /// Identity of the summary.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Range amounts are clamped to.
    pub fn range(&self) -> (i64, i64) {
        self.counters.range()
    }

    /// Records an amount.  Negative amounts are dropped.
    pub fn record(&self, amount: i64) {
        if amount >= 0 {
            self.summary.record(amount);
            self.counters.record(amount);
        }
    }

    /// Estimates the `p`th percentile of the recorded amounts, or `NaN` if nothing was recorded.
    pub fn percentile(&self, p: f64) -> f64 {
        self.counters.percentiles(&[p])[0]
    }

    /// Estimates several percentiles at once.  `pcts` must be sorted ascending.
    pub fn percentiles(&self, pcts: &[f64]) -> Vec<f64> {
        self.counters.percentiles(pcts)
    }

    /// Number of recorded amounts, as seen by the underlying summary.
    pub fn count(&self) -> u64 {
        self.summary.count()
    }

    /// Sum of recorded amounts, as seen by the underlying summary.
    pub fn total_amount(&self) -> i64 {
        self.summary.total_amount()
    }
}

/// Builder for a [`PercentileDistributionSummary`].
pub struct PercentileDistributionSummaryBuilder {
    registry: Arc<Registry>,
    id: Option<Id>,
    name: Option<String>,
    tags: Vec<(String, String)>,
    min: i64,
    max: i64,
}

impl PercentileDistributionSummaryBuilder {
    /// Sets the identity of the summary.  Takes precedence over the name and tags.
    #[must_use]
    pub fn with_id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the name of the summary.
    #[must_use]
    pub fn with_name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds tags to the summary.
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

    /// Sets the range amounts are clamped to.
    ///
    /// Defaults to every possible amount.
    #[must_use]
    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Builds the summary.
    ///
    /// # Errors
    ///
    /// Fails if neither an identity nor a name was set, or if the range is invalid.
    pub fn build(self) -> Result<PercentileDistributionSummary, BuildError> {
        let id = match (self.id, self.name) {
            (Some(id), _) => id,
            (None, Some(name)) => self.registry.new_id(name, self.tags),
            (None, None) => return Err(BuildError::MissingName),
        };
        PercentileDistributionSummary::with_range(&self.registry, id, self.min, self.max)
    }
}
