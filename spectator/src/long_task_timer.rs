use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use quanta::{Clock, Instant};

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
};

/// Tracks a small number of long running tasks, such as batch jobs.
///
/// Unlike a [`Timer`](crate::Timer), nothing is recorded when a task ends.  Each measurement
/// reports the number of running tasks (`statistic=activeTasks`) and the sum of their elapsed
/// times in seconds (`statistic=duration`), and neither is reset.
pub struct LongTaskTimer {
    id: Id,
    active_id: Id,
    duration_id: Id,
    next_task: AtomicU64,
    tasks: Mutex<HashMap<u64, Instant>>,
    clock: Clock,
}

impl LongTaskTimer {
    /// Creates a new `LongTaskTimer`.
    pub fn new(id: Id) -> Self {
        Self::with_clock(id, Clock::new())
    }

    /// Creates a new `LongTaskTimer` that reads elapsed time from `clock`.
    pub fn with_clock(id: Id, clock: Clock) -> Self {
        let active_id = id.with_stat(Statistic::ActiveTasks);
        let duration_id = id.with_stat(Statistic::Duration);
        Self {
            id,
            active_id,
            duration_id,
            next_task: AtomicU64::new(0),
            tasks: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Identity of the timer.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Starts tracking a new task, returning the handle to pass to [`stop`](LongTaskTimer::stop).
    pub fn start(&self) -> u64 {
        let task = self.next_task.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().insert(task, self.clock.now());
        task
    }

    /// Stops tracking `task` and returns how long it ran, in seconds.
    ///
    /// Returns `-1.0` if `task` is not running.
    pub fn stop(&self, task: u64) -> f64 {
        match self.tasks.lock().remove(&task) {
            Some(start) => self.clock.now().duration_since(start).as_secs_f64(),
            None => -1.0,
        }
    }

    /// Number of running tasks.
    pub fn active_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Sum of the elapsed times of all running tasks, in seconds.
    pub fn duration(&self) -> f64 {
        let now = self.clock.now();
        self.tasks.lock().values().map(|start| now.duration_since(*start).as_secs_f64()).sum()
    }

    /// Reports the running tasks and their total duration.
    pub fn measure(&self) -> Vec<Measurement> {
        let now = self.clock.now();
        let tasks = self.tasks.lock();
        let duration: f64 = tasks.values().map(|start| now.duration_since(*start).as_secs_f64()).sum();
        vec![
            Measurement::new(self.active_id.clone(), tasks.len() as f64),
            Measurement::new(self.duration_id.clone(), duration),
        ]
    }
}

impl fmt::Debug for LongTaskTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongTaskTimer")
            .field("id", &self.id)
            .field("active_tasks", &self.active_tasks())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;
    use quanta::Clock;

    use super::LongTaskTimer;
    use crate::id::Id;

    #[test]
    fn reports_active_tasks_and_duration() {
        let (clock, mock) = Clock::mock();
        let timer = LongTaskTimer::with_clock(Id::from_name("ltt"), clock);

        let first = timer.start();
        mock.increment(Duration::from_secs(2));
        let _second = timer.start();
        mock.increment(Duration::from_secs(1));

        assert_eq!(timer.active_tasks(), 2);
        assert_relative_eq!(timer.duration(), 4.0);

        let ms = timer.measure();
        assert_eq!(ms.len(), 2);
        assert_eq!(ms[0].id().tag("statistic"), Some("activeTasks"));
        assert_relative_eq!(ms[0].value(), 2.0);
        assert_eq!(ms[1].id().tag("statistic"), Some("duration"));
        assert_relative_eq!(ms[1].value(), 4.0);

        // Measuring does not reset running tasks.
        assert_eq!(timer.measure().len(), 2);

        assert_relative_eq!(timer.stop(first), 3.0);
        assert_eq!(timer.active_tasks(), 1);
    }

    #[test]
    fn stopping_unknown_task_is_negative() {
        let timer = LongTaskTimer::new(Id::from_name("ltt"));
        let task = timer.start();
        assert!(timer.stop(task + 1) < 0.0);
        assert!(timer.stop(task) >= 0.0);
        assert!(timer.stop(task) < 0.0);
    }

    #[test]
    fn idle_timer_reports_zero() {
        let timer = LongTaskTimer::new(Id::from_name("ltt"));
        let values: Vec<f64> = timer.measure().iter().map(|m| m.value()).collect();
        assert_eq!(values, vec![0.0, 0.0]);
    }
}
