//! Thread-safe storage of meters keyed by identity.

use std::{
    collections::HashMap as StdHashMap,
    hash::BuildHasher,
    iter::repeat,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use hashbrown::{DefaultHashBuilder, HashMap};
use tracing::{debug, warn};

use crate::{
    age_gauge::AgeGauge,
    config::RegistryConfig,
    counter::Counter,
    dist_summary::DistributionSummary,
    gauge::{Gauge, MaxGauge},
    id::Id,
    interval_counter::IntervalCounter,
    long_task_timer::LongTaskTimer,
    measurement::Measurement,
    monotonic::{MonotonicCounter, MonotonicCounterUint},
    polled::{PolledCounter, PolledGauge},
    timer::Timer,
};

type Shard = RwLock<HashMap<Id, Meter, DefaultHashBuilder>>;

/// A meter stored in a [`Registry`].
#[derive(Clone, Debug)]
pub enum Meter {
    /// A counter.
    Counter(Arc<Counter>),
    /// A timer.
    Timer(Arc<Timer>),
    /// A distribution summary.
    DistributionSummary(Arc<DistributionSummary>),
    /// A gauge.
    Gauge(Arc<Gauge>),
    /// A max gauge.
    MaxGauge(Arc<MaxGauge>),
    /// A gauge reporting the age of an event.
    AgeGauge(Arc<AgeGauge>),
    /// A delta counter over a sampled monotonic number.
    MonotonicCounter(Arc<MonotonicCounter>),
    /// A delta counter over a sampled unsigned monotonic number.
    MonotonicCounterUint(Arc<MonotonicCounterUint>),
    /// A timer of long running tasks.
    LongTaskTimer(Arc<LongTaskTimer>),
    /// A counter tracking the time since its last update.
    IntervalCounter(Arc<IntervalCounter>),
    /// A gauge sampled from functions.
    PolledGauge(Arc<PolledGauge>),
    /// A counter sampled from monotonic functions.
    PolledCounter(Arc<PolledCounter>),
}

macro_rules! each_meter {
    ($meter:expr, |$m:ident| $body:expr) => {
        match $meter {
            Meter::Counter($m) => $body,
            Meter::Timer($m) => $body,
            Meter::DistributionSummary($m) => $body,
            Meter::Gauge($m) => $body,
            Meter::MaxGauge($m) => $body,
            Meter::AgeGauge($m) => $body,
            Meter::MonotonicCounter($m) => $body,
            Meter::MonotonicCounterUint($m) => $body,
            Meter::LongTaskTimer($m) => $body,
            Meter::IntervalCounter($m) => $body,
            Meter::PolledGauge($m) => $body,
            Meter::PolledCounter($m) => $body,
        }
    };
}

impl Meter {
    /// Identity of the meter.
    pub fn id(&self) -> &Id {
        each_meter!(self, |m| m.id())
    }

    /// Short name of the meter type.
    pub fn kind(&self) -> &'static str {
        match self {
            Meter::Counter(_) => Counter::KIND,
            Meter::Timer(_) => Timer::KIND,
            Meter::DistributionSummary(_) => DistributionSummary::KIND,
            Meter::Gauge(_) => Gauge::KIND,
            Meter::MaxGauge(_) => MaxGauge::KIND,
            Meter::AgeGauge(_) => AgeGauge::KIND,
            Meter::MonotonicCounter(_) => MonotonicCounter::KIND,
            Meter::MonotonicCounterUint(_) => MonotonicCounterUint::KIND,
            Meter::LongTaskTimer(_) => LongTaskTimer::KIND,
            Meter::IntervalCounter(_) => IntervalCounter::KIND,
            Meter::PolledGauge(_) => PolledGauge::KIND,
            Meter::PolledCounter(_) => PolledCounter::KIND,
        }
    }

    /// Takes the meter's current measurements, resetting it.
    ///
    /// Meters reporting a current state, such as an [`AgeGauge`] or a [`LongTaskTimer`], are not
    /// reset.
    pub fn measure(&self) -> Vec<Measurement> {
        each_meter!(self, |m| m.measure())
    }
}

/// Glue between a concrete meter type and its [`Meter`] variant.
trait Registered: Sized {
    const KIND: &'static str;

    fn create(id: Id, config: &RegistryConfig) -> Self;

    fn wrap(meter: Arc<Self>) -> Meter;

    fn unwrap(meter: &Meter) -> Option<&Arc<Self>>;
}

macro_rules! registered {
    ($ty:ident, $kind:literal, |$id:ident, $config:ident| $create:expr) => {
        impl Registered for $ty {
            const KIND: &'static str = $kind;

            fn create($id: Id, $config: &RegistryConfig) -> Self {
                $create
            }

            fn wrap(meter: Arc<Self>) -> Meter {
                Meter::$ty(meter)
            }

            fn unwrap(meter: &Meter) -> Option<&Arc<Self>> {
                match meter {
                    Meter::$ty(m) => Some(m),
                    _ => None,
                }
            }
        }
    };
}

registered!(Counter, "counter", |id, _config| Counter::new(id));
registered!(Timer, "timer", |id, config| Timer::with_clock(id, config.clock().clone()));
registered!(DistributionSummary, "distribution-summary", |id, _config| DistributionSummary::new(id));
registered!(Gauge, "gauge", |id, _config| Gauge::new(id));
registered!(MaxGauge, "max-gauge", |id, _config| MaxGauge::new(id));
registered!(AgeGauge, "age-gauge", |id, _config| AgeGauge::new(id));
registered!(MonotonicCounter, "monotonic-counter", |id, _config| MonotonicCounter::new(id));
registered!(MonotonicCounterUint, "monotonic-counter-uint", |id, _config| MonotonicCounterUint::new(id));
registered!(LongTaskTimer, "long-task-timer", |id, config| LongTaskTimer::with_clock(id, config.clock().clone()));
registered!(IntervalCounter, "interval-counter", |id, config| IntervalCounter::with_clock(id, config.clock().clone()));
registered!(PolledGauge, "polled-gauge", |id, _config| PolledGauge::new(id));
registered!(PolledCounter, "polled-counter", |id, _config| PolledCounter::new(id));

/// A registry of meters.
///
/// Holds at most one meter per [`Id`] for its whole lifetime: asking twice for a counter with the
/// same identity returns the same counter.  Asking for a meter of a different type than the one
/// already registered logs a warning and returns a detached meter that is never reported.  The
/// detached meter is kept, so later requests for the same identity and type return it again
/// without another warning.
///
/// ## Performance
///
/// `Registry` is optimized for reads.  Meters are spread over a power-of-two number of shards, and
/// looking up an existing meter only takes a read lock on one shard.
pub struct Registry {
    shards: Vec<Shard>,
    shard_mask: usize,
    hasher: DefaultHashBuilder,
    config: RegistryConfig,
    detached: Mutex<StdHashMap<(Id, &'static str), Meter>>,
}

impl Registry {
    /// Creates a new `Registry` with the given configuration.
    pub fn new(config: RegistryConfig) -> Self {
        let shard_count = std::cmp::max(1, num_cpus::get()).next_power_of_two();
        let shard_mask = shard_count - 1;
        let hasher = DefaultHashBuilder::default();
        let shards = repeat(())
            .take(shard_count)
            .map(|_| RwLock::new(HashMap::with_hasher(hasher.clone())))
            .collect();

        Self { shards, shard_mask, hasher, config, detached: Mutex::new(StdHashMap::new()) }
    }

    /// Configuration of this registry.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Creates an identity with the configured common tags.
    ///
    /// Explicit tags take precedence over common tags with the same key.
    pub fn new_id<N, I, K, V>(&self, name: N, tags: I) -> Id
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Id::new(name, self.config.common_tags().clone()).with_tags(tags)
    }

    #[inline]
    fn get_hash_and_shard(&self, id: &Id) -> (u64, &Shard) {
        let hash = self.hasher.hash_one(id);

        // Shard on the upper half so the low bits still spread entries within a shard.
        let shard = &self.shards[(hash >> 32) as usize & self.shard_mask];

        (hash, shard)
    }

    fn get_or_create<M: Registered>(&self, id: &Id) -> Arc<M> {
        let (hash, shard) = self.get_hash_and_shard(id);

        // Try and get the meter if it exists.
        let shard_read = shard.read().unwrap_or_else(PoisonError::into_inner);
        let meter = match shard_read.raw_entry().from_key_hashed_nocheck(hash, id) {
            Some((_, meter)) => meter.clone(),
            None => {
                // Switch to write guard and insert the meter first.
                drop(shard_read);
                let mut shard_write = shard.write().unwrap_or_else(PoisonError::into_inner);
                let (_, meter) =
                    shard_write.raw_entry_mut().from_key_hashed_nocheck(hash, id).or_insert_with(
                        || {
                            debug!(%id, kind = M::KIND, "Registering meter.");
                            (id.clone(), M::wrap(Arc::new(M::create(id.clone(), &self.config))))
                        },
                    );
                meter.clone()
            }
        };

        match M::unwrap(&meter) {
            Some(m) => Arc::clone(m),
            None => self.detached_meter(id, meter.kind()),
        }
    }

    fn detached_meter<M: Registered>(&self, id: &Id, registered: &'static str) -> Arc<M> {
        let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = detached.entry((id.clone(), M::KIND)).or_insert_with(|| {
            warn!(
                %id,
                registered,
                requested = M::KIND,
                "Meter already registered with a different type, returning a detached meter."
            );
            M::wrap(Arc::new(M::create(id.clone(), &self.config)))
        });

        match M::unwrap(entry) {
            Some(m) => Arc::clone(m),
            None => Arc::new(M::create(id.clone(), &self.config)),
        }
    }

    /// Gets or creates the counter with the given name and tags.
    pub fn counter<N, I, K, V>(&self, name: N, tags: I) -> Arc<Counter>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.counter_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the counter with the given identity.
    pub fn counter_with_id(&self, id: &Id) -> Arc<Counter> {
        self.get_or_create(id)
    }

    /// Gets or creates the timer with the given name and tags.
    pub fn timer<N, I, K, V>(&self, name: N, tags: I) -> Arc<Timer>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.timer_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the timer with the given identity.
    pub fn timer_with_id(&self, id: &Id) -> Arc<Timer> {
        self.get_or_create(id)
    }

    /// Gets or creates the distribution summary with the given name and tags.
    pub fn distribution_summary<N, I, K, V>(&self, name: N, tags: I) -> Arc<DistributionSummary>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.distribution_summary_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the distribution summary with the given identity.
    pub fn distribution_summary_with_id(&self, id: &Id) -> Arc<DistributionSummary> {
        self.get_or_create(id)
    }

    /// Gets or creates the gauge with the given name and tags.
    pub fn gauge<N, I, K, V>(&self, name: N, tags: I) -> Arc<Gauge>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.gauge_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the gauge with the given identity.
    pub fn gauge_with_id(&self, id: &Id) -> Arc<Gauge> {
        self.get_or_create(id)
    }

    /// Gets or creates the gauge with the given name and tags, with values that live for `ttl` on
    /// the agent.
    ///
    /// The time to live applies to the registered gauge, so it replaces any earlier one.
    pub fn gauge_with_ttl<N, I, K, V>(&self, name: N, tags: I, ttl: Duration) -> Arc<Gauge>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.gauge_with_id_and_ttl(&self.new_id(name, tags), ttl)
    }

    /// Gets or creates the gauge with the given identity, with values that live for `ttl` on the
    /// agent.
    pub fn gauge_with_id_and_ttl(&self, id: &Id, ttl: Duration) -> Arc<Gauge> {
        let gauge = self.gauge_with_id(id);
        gauge.set_ttl(ttl);
        gauge
    }

    /// Gets or creates the max gauge with the given name and tags.
    pub fn max_gauge<N, I, K, V>(&self, name: N, tags: I) -> Arc<MaxGauge>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.max_gauge_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the max gauge with the given identity.
    pub fn max_gauge_with_id(&self, id: &Id) -> Arc<MaxGauge> {
        self.get_or_create(id)
    }

    /// Gets or creates the age gauge with the given name and tags.
    pub fn age_gauge<N, I, K, V>(&self, name: N, tags: I) -> Arc<AgeGauge>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.age_gauge_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the age gauge with the given identity.
    pub fn age_gauge_with_id(&self, id: &Id) -> Arc<AgeGauge> {
        self.get_or_create(id)
    }

    /// Gets or creates the monotonic counter with the given name and tags.
    pub fn monotonic_counter<N, I, K, V>(&self, name: N, tags: I) -> Arc<MonotonicCounter>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.monotonic_counter_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the monotonic counter with the given identity.
    pub fn monotonic_counter_with_id(&self, id: &Id) -> Arc<MonotonicCounter> {
        self.get_or_create(id)
    }

    /// Gets or creates the unsigned monotonic counter with the given name and tags.
    pub fn monotonic_counter_uint<N, I, K, V>(&self, name: N, tags: I) -> Arc<MonotonicCounterUint>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.monotonic_counter_uint_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the unsigned monotonic counter with the given identity.
    pub fn monotonic_counter_uint_with_id(&self, id: &Id) -> Arc<MonotonicCounterUint> {
        self.get_or_create(id)
    }

    /// Gets or creates the long task timer with the given name and tags.
    pub fn long_task_timer<N, I, K, V>(&self, name: N, tags: I) -> Arc<LongTaskTimer>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.long_task_timer_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the long task timer with the given identity.
    pub fn long_task_timer_with_id(&self, id: &Id) -> Arc<LongTaskTimer> {
        self.get_or_create(id)
    }

    /// Gets or creates the interval counter with the given name and tags.
    pub fn interval_counter<N, I, K, V>(&self, name: N, tags: I) -> Arc<IntervalCounter>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.interval_counter_with_id(&self.new_id(name, tags))
    }

    /// Gets or creates the interval counter with the given identity.
    pub fn interval_counter_with_id(&self, id: &Id) -> Arc<IntervalCounter> {
        self.get_or_create(id)
    }

    /// Gets or creates the polled gauge with the given identity.
    ///
    /// See [`PolledMeter`](crate::PolledMeter) for adding functions by name and tags.
    pub fn polled_gauge_with_id(&self, id: &Id) -> Arc<PolledGauge> {
        self.get_or_create(id)
    }

    /// Gets or creates the polled counter with the given identity.
    pub fn polled_counter_with_id(&self, id: &Id) -> Arc<PolledCounter> {
        self.get_or_create(id)
    }

    /// Returns a snapshot of every registered meter.
    ///
    /// Shards are visited one at a time, so meters registered while the snapshot is taken may or
    /// may not be included.
    pub fn meters(&self) -> Vec<Meter> {
        let mut meters = Vec::new();
        for shard in &self.shards {
            let shard_read = shard.read().unwrap_or_else(PoisonError::into_inner);
            meters.extend(shard_read.values().cloned());
        }
        meters
    }

    /// Takes the current measurements of every meter, resetting them.
    pub fn measurements(&self) -> Vec<Measurement> {
        self.meters().iter().flat_map(Meter::measure).collect()
    }

    /// Number of registered meters.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len()).sum()
    }

    /// Returns `true` if no meter is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every meter from the registry.
    ///
    /// Handles obtained earlier keep working but are no longer reported.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.detached.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("meters", &self.len())
            .field("shards", &self.shards.len())
            .field("config", &self.config)
            .finish()
    }
}
