use parking_lot::Mutex;

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
    stats::{StatIds, Stats},
};

/// Tracks the distribution of amounts, such as request sizes.
#[derive(Debug)]
pub struct DistributionSummary {
    id: Id,
    ids: StatIds,
    stats: Mutex<Stats>,
}

impl DistributionSummary {
    /// Creates a new `DistributionSummary`.
    pub fn new(id: Id) -> Self {
        let ids = StatIds::new(&id, Statistic::TotalAmount);
        Self { id, ids, stats: Mutex::new(Stats::default()) }
    }

    /// Identity of the summary.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Records an amount.  Negative amounts are dropped.
    pub fn record(&self, amount: i64) {
        if amount >= 0 {
            self.stats.lock().record(amount);
        }
    }

    /// Number of recorded amounts since the last measurement.
    pub fn count(&self) -> u64 {
        self.stats.lock().count
    }

    /// Sum of recorded amounts since the last measurement.
    pub fn total_amount(&self) -> i64 {
        self.stats.lock().total
    }

    /// Takes the current statistics, resetting them.
    pub fn measure(&self) -> Vec<Measurement> {
        let stats = self.stats.lock().take();
        self.ids.measure(stats, 1.0)
    }
}
