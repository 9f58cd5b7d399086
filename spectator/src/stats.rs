use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
};

/// Running statistics shared by timers and distribution summaries.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Stats {
    pub count: u64,
    pub total: i64,
    pub total_of_squares: f64,
    pub max: i64,
}

impl Stats {
    pub fn record(&mut self, amount: i64) {
        self.count += 1;
        self.total = self.total.saturating_add(amount);
        let amount_f = amount as f64;
        self.total_of_squares += amount_f * amount_f;
        if amount > self.max {
            self.max = amount;
        }
    }

    pub fn take(&mut self) -> Stats {
        std::mem::take(self)
    }
}

/// Pre-built identities for the four statistics a timer or summary reports.
#[derive(Debug)]
pub(crate) struct StatIds {
    count: Id,
    total: Id,
    total_of_squares: Id,
    max: Id,
}

impl StatIds {
    pub fn new(id: &Id, total: Statistic) -> Self {
        Self {
            count: id.with_stat(Statistic::Count),
            total: id.with_stat(total),
            total_of_squares: id.with_stat(Statistic::TotalOfSquares),
            max: id.with_stat(Statistic::Max),
        }
    }

    /// Converts a snapshot to measurements, dividing values by `scale` (squares by `scale²`).
    pub fn measure(&self, stats: Stats, scale: f64) -> Vec<Measurement> {
        if stats.count == 0 {
            return Vec::new();
        }

        vec![
            Measurement::new(self.count.clone(), stats.count as f64),
            Measurement::new(self.total.clone(), stats.total as f64 / scale),
            Measurement::new(self.total_of_squares.clone(), stats.total_of_squares / (scale * scale)),
            Measurement::new(self.max.clone(), stats.max as f64 / scale),
        ]
    }
}
