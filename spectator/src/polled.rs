use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    id::Id,
    measurement::{Measurement, Statistic},
    percentile::BuildError,
    registry::Registry,
};

type ValueFn = Box<dyn Fn() -> f64 + Send + Sync>;

/// A gauge whose value is sampled from functions each time it is measured.
///
/// The reported value is the sum of every monitored function.  Nothing is reported until a
/// function is added.
pub struct PolledGauge {
    id: Id,
    gauge_id: Id,
    functions: Mutex<Vec<ValueFn>>,
}

impl PolledGauge {
    /// Creates a new `PolledGauge` with no functions.
    pub fn new(id: Id) -> Self {
        let gauge_id = id.with_default_stat(Statistic::Gauge);
        Self { id, gauge_id, functions: Mutex::new(Vec::new()) }
    }

    /// Identity of the gauge.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Adds a function to sample.
    pub fn monitor<F>(&self, f: F)
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.functions.lock().push(Box::new(f));
    }

    /// Samples every function and returns their sum, or `None` without functions.
    pub fn get(&self) -> Option<f64> {
        let functions = self.functions.lock();
        if functions.is_empty() {
            None
        } else {
            Some(functions.iter().map(|f| f()).sum())
        }
    }

    /// Samples the current value.
    pub fn measure(&self) -> Vec<Measurement> {
        self.get().map(|value| Measurement::new(self.gauge_id.clone(), value)).into_iter().collect()
    }
}

impl fmt::Debug for PolledGauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolledGauge")
            .field("id", &self.id)
            .field("functions", &self.functions.lock().len())
            .finish()
    }
}

struct Source {
    f: ValueFn,
    previous: f64,
}

/// A counter fed by functions returning monotonically increasing numbers.
///
/// Each measurement reports how much the functions grew since the previous one.  A function that
/// goes down is ignored until it climbs back above its highest seen value.
pub struct PolledCounter {
    id: Id,
    count_id: Id,
    sources: Mutex<Vec<Source>>,
}

impl PolledCounter {
    /// Creates a new `PolledCounter` with no functions.
    pub fn new(id: Id) -> Self {
        let count_id = id.with_default_stat(Statistic::Count);
        Self { id, count_id, sources: Mutex::new(Vec::new()) }
    }

    /// Identity of the counter.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Adds a function to sample.  Its current value is the baseline of the first delta.
    pub fn monitor<F>(&self, f: F)
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let previous = f();
        self.sources.lock().push(Source { f: Box::new(f), previous });
    }

    /// Samples every function and reports the total growth since the previous measurement.
    pub fn measure(&self) -> Vec<Measurement> {
        let mut delta = 0.0;
        for source in self.sources.lock().iter_mut() {
            let current = (source.f)();
            if current > source.previous {
                delta += current - source.previous;
                source.previous = current;
            }
        }

        if delta > 0.0 {
            vec![Measurement::new(self.count_id.clone(), delta)]
        } else {
            Vec::new()
        }
    }
}

impl fmt::Debug for PolledCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolledCounter")
            .field("id", &self.id)
            .field("functions", &self.sources.lock().len())
            .finish()
    }
}

/// Entry point for monitoring values computed by functions.
///
/// ```
/// use std::sync::{
///     atomic::{AtomicUsize, Ordering},
///     Arc,
/// };
///
/// use spectator::{PolledMeter, Registry};
///
/// let registry = Registry::default();
/// let queue = Arc::new(AtomicUsize::new(3));
///
/// let observed = Arc::clone(&queue);
/// let gauge = PolledMeter::using(&registry)
///     .with_name("queue.size")
///     .monitor_value(move || observed.load(Ordering::Relaxed) as f64)
///     .expect("named meter");
/// assert_eq!(gauge.get(), Some(3.0));
/// ```
#[derive(Debug)]
pub struct PolledMeter;

impl PolledMeter {
    /// Starts building a polled meter registered in `registry`.
    pub fn using(registry: &Registry) -> PolledMeterBuilder<'_> {
        PolledMeterBuilder { registry, id: None, name: None, tags: Vec::new() }
    }
}

/// Builder for [`PolledGauge`] and [`PolledCounter`].
///
/// Monitoring several functions under the same identity adds them to the same meter.
#[derive(Debug)]
pub struct PolledMeterBuilder<'a> {
    registry: &'a Registry,
    id: Option<Id>,
    name: Option<String>,
    tags: Vec<(String, String)>,
}

impl<'a> PolledMeterBuilder<'a> {
    /// Sets the identity of the meter, taking precedence over a name and tags.
    #[must_use]
    pub fn with_id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the name of the meter.
    #[must_use]
    pub fn with_name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds tags to the meter.
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

    fn into_id(self) -> Result<(Id, &'a Registry), BuildError> {
        match (self.id, self.name) {
            (Some(id), _) => Ok((id, self.registry)),
            (None, Some(name)) => Ok((self.registry.new_id(name, self.tags), self.registry)),
            (None, None) => Err(BuildError::MissingName),
        }
    }

    /// Reports the sum of `f` and any other function monitored under the same identity as a gauge.
    pub fn monitor_value<F>(self, f: F) -> Result<Arc<PolledGauge>, BuildError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let (id, registry) = self.into_id()?;
        let gauge = registry.polled_gauge_with_id(&id);
        gauge.monitor(f);
        Ok(gauge)
    }

    /// Reports the growth of `f` and any other function monitored under the same identity as a
    /// counter.
    pub fn monitor_monotonic_number<F>(self, f: F) -> Result<Arc<PolledCounter>, BuildError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let (id, registry) = self.into_id()?;
        let counter = registry.polled_counter_with_id(&id);
        counter.monitor(f);
        Ok(counter)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    use super::{PolledCounter, PolledGauge, PolledMeter};
    use crate::{id::Id, percentile::BuildError, registry::Registry};

    fn shared(value: u64) -> (Arc<AtomicU64>, impl Fn() -> f64 + Send + Sync + 'static) {
        let cell = Arc::new(AtomicU64::new(value));
        let observed = Arc::clone(&cell);
        (cell, move || observed.load(Ordering::Relaxed) as f64)
    }

    #[test]
    fn gauge_sums_functions() {
        let gauge = PolledGauge::new(Id::from_name("g"));
        assert!(gauge.measure().is_empty());

        let (x, f) = shared(1);
        gauge.monitor(f);
        let (_, g) = shared(43);
        gauge.monitor(g);
        x.store(42, Ordering::Relaxed);

        let ms = gauge.measure();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].id().tag("statistic"), Some("gauge"));
        assert_eq!(ms[0].value(), 42.0 + 43.0);

        // Polled again on every measurement.
        assert_eq!(gauge.measure().len(), 1);
    }

    #[test]
    fn counter_reports_growth() {
        let counter = PolledCounter::new(Id::from_name("c"));
        let (x, f) = shared(100);
        counter.monitor(f);
        let (y, g) = shared(200);
        counter.monitor(g);

        x.store(142, Ordering::Relaxed);
        y.store(201, Ordering::Relaxed);
        let ms = counter.measure();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].id().tag("statistic"), Some("count"));
        assert_eq!(ms[0].value(), 43.0);
        assert!(counter.measure().is_empty());

        // Going down is ignored until the previous high is exceeded.
        x.store(100, Ordering::Relaxed);
        assert!(counter.measure().is_empty());
        x.store(150, Ordering::Relaxed);
        assert_eq!(counter.measure()[0].value(), 8.0);
    }

    #[test]
    fn builder_shares_meter_per_identity() {
        let registry = Registry::default();
        let (_, f) = shared(1);
        let (_, g) = shared(2);
        let a = PolledMeter::using(&registry).with_name("polled").with_tags([("foo", "bar")]).monitor_value(f).unwrap();
        let b = PolledMeter::using(&registry).with_id(a.id().clone()).monitor_value(g).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.get(), Some(3.0));
        assert_eq!(a.id().tag("foo"), Some("bar"));
    }

    #[test]
    fn mixing_polled_types_leaves_registry_alone() {
        let registry = Registry::default();
        let id = Id::from_name("foo");
        let (x, f) = shared(100);
        let counter = PolledMeter::using(&registry).with_id(id.clone()).monitor_monotonic_number(f).unwrap();

        let (_, g) = shared(7);
        let gauge = PolledMeter::using(&registry).with_id(id).monitor_value(g).unwrap();
        assert_eq!(gauge.get(), Some(7.0));

        x.store(110, Ordering::Relaxed);
        let ms = registry.measurements();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].value(), 10.0);
        assert_eq!(counter.id().name(), "foo");
    }

    #[test]
    fn builder_requires_a_name() {
        let registry = Registry::default();
        let err = PolledMeter::using(&registry).monitor_value(|| 1.0).err();
        assert_eq!(err, Some(BuildError::MissingName));
    }
}
