//! Dimensional meters backed by a thread-safe registry.
//!
//! Meters are identified by an [`Id`]: a name plus a set of tags.  A [`Registry`] keeps at most one
//! meter per identity, hands out shared handles to it, and can be drained of its current
//! [`Measurement`]s by a publisher.
//!
//! ## Plain meters
//!
//! - [`Counter`]: number of events.
//! - [`Timer`]: number, total, total of squares and maximum of durations.
//! - [`DistributionSummary`]: the same statistics for arbitrary amounts.
//! - [`Gauge`] and [`MaxGauge`]: last value and largest value.
//!
//! Reading measurements resets the meters, so every publish reports the activity since the
//! previous one.
//!
//! ## State meters
//!
//! - [`LongTaskTimer`]: number and total duration of running tasks.
//! - [`IntervalCounter`]: a counter that also reports the time since its last update.
//! - [`AgeGauge`]: seconds since an event last happened.
//! - [`MonotonicCounter`] and [`MonotonicCounterUint`]: growth of a number sampled from elsewhere.
//! - [`PolledGauge`] and [`PolledCounter`]: values computed by functions at measurement time,
//!   registered through [`PolledMeter`].
//!
//! These report their current state on every publish instead of being reset.
//!
//! ## Percentile meters
//!
//! [`PercentileTimer`] and [`PercentileDistributionSummary`] additionally count each value in one
//! of 276 exponentially sized buckets, with one registry counter per used bucket.  Percentiles can
//! then be estimated locally through [`PercentileTimer::percentile`], or on the backend across any
//! combination of dimensions.
//!
//! ## Bucket meters
//!
//! [`BucketCounter`], [`BucketTimer`] and [`BucketDistributionSummary`] classify each value with a
//! [`BucketFn`] and forward it to a sub-meter tagged with the bucket's label.  Readable, sortable
//! bucket schemes are available in [`bucket_functions`].
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//!
//! use spectator::{PercentileTimer, Registry};
//!
//! let registry = Arc::new(Registry::default());
//! registry.counter("server.requests", [("status", "200")]).increment();
//!
//! let latency = PercentileTimer::builder(&registry)
//!     .with_name("server.latency")
//!     .with_range(Duration::from_millis(1), Duration::from_secs(10))
//!     .build()
//!     .expect("valid range");
//! latency.record(Duration::from_millis(25));
//! assert!(latency.percentile(50.0) > 0.0);
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod age_gauge;
pub use self::age_gauge::AgeGauge;

mod bucket;
pub use self::bucket::{BucketCounter, BucketDistributionSummary, BucketTimer, BUCKET_TAG};

mod config;
pub use self::config::{is_valid_tag, tags_from_env, tags_from_env_with, validate_tags, RegistryConfig, ENV_TAGS};

mod counter;
pub use self::counter::Counter;

mod dist_summary;
pub use self::dist_summary::DistributionSummary;

mod gauge;
pub use self::gauge::{Gauge, MaxGauge};

mod id;
pub use self::id::{Id, STATISTIC_TAG};

mod interval_counter;
pub use self::interval_counter::IntervalCounter;

mod long_task_timer;
pub use self::long_task_timer::LongTaskTimer;

mod measurement;
pub use self::measurement::{Measurement, Op, Statistic};

mod monotonic;
pub use self::monotonic::{MonotonicCounter, MonotonicCounterUint};

mod percentile;
pub use self::percentile::{BuildError, PERCENTILE_TAG};

mod percentile_dist_summary;
pub use self::percentile_dist_summary::{PercentileDistributionSummary, PercentileDistributionSummaryBuilder};

mod percentile_timer;
pub use self::percentile_timer::{PercentileTimer, PercentileTimerBuilder};

mod polled;
pub use self::polled::{PolledCounter, PolledGauge, PolledMeter, PolledMeterBuilder};

mod registry;
pub use self::registry::{Meter, Registry};

mod stats;

mod timer;
pub use self::timer::Timer;

pub use spectator_util::{bucket_functions, percentile_buckets, BucketFn};
