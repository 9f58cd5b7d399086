//! Bucket functions that map a value to a small set of readable, sortable labels.
//!
//! Each factory partitions the range `[0, max]` into four buckets and produces one label per
//! bucket, plus two sentinel labels for values below zero and values above `max`.  Numeric labels
//! produced by a single call share the same digit width and unit suffix, so sorting them as strings
//! orders them the same way as their numeric boundaries.
//!
//! Two bias modes are supported.  The default places the boundaries at `max/8`, `max/4`, `max/2`
//! and `max`, giving more resolution to small values.  The `*_bias_*` variants place them at
//! `max - max/2`, `max - max/4`, `max - max/8` and `max`, giving more resolution close to the
//! maximum.
use std::fmt;

use thiserror::Error;

/// Maps a value to the label of the bucket it falls into.
///
/// Implemented by [`LabeledBuckets`] and by any `Fn(i64) -> &'static str` closure, so hand-written
/// bucket schemes can be used wherever a generated one can.
pub trait BucketFn: Send + Sync {
    /// Returns the bucket label for `amount`.
    fn bucket(&self, amount: i64) -> &str;
}

impl<F> BucketFn for F
where
    F: Fn(i64) -> &'static str + Send + Sync,
{
    fn bucket(&self, amount: i64) -> &str {
        self(amount)
    }
}

/// Errors that could occur while building a bucket function.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BucketError {
    /// The maximum was zero or negative.
    #[error("maximum must be positive (got {max})")]
    NonPositiveMaximum {
        /// The rejected maximum.
        max: i64,
    },

    /// The maximum could not be represented in nanoseconds.
    #[error("maximum of {max}{unit} overflows when converted to nanoseconds")]
    Overflow {
        /// The rejected maximum.
        max: i64,

        /// Suffix of the unit the maximum was given in.
        unit: &'static str,
    },
}

/// Unit of a time-based maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Nanoseconds.
    Nanoseconds,
    /// Microseconds.
    Microseconds,
    /// Milliseconds.
    Milliseconds,
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

const NANOS: i64 = 1;
const MICROS: i64 = 1_000 * NANOS;
const MILLIS: i64 = 1_000 * MICROS;
const SECONDS: i64 = 1_000 * MILLIS;
const MINUTES: i64 = 60 * SECONDS;
const HOURS: i64 = 60 * MINUTES;
const DAYS: i64 = 24 * HOURS;

impl TimeUnit {
    /// Returns the number of nanoseconds in one unit.
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            TimeUnit::Nanoseconds => NANOS,
            TimeUnit::Microseconds => MICROS,
            TimeUnit::Milliseconds => MILLIS,
            TimeUnit::Seconds => SECONDS,
            TimeUnit::Minutes => MINUTES,
            TimeUnit::Hours => HOURS,
            TimeUnit::Days => DAYS,
        }
    }

    /// Converts `amount` of this unit to nanoseconds, or `None` if the result overflows.
    pub fn to_nanos(self, amount: i64) -> Option<i64> {
        amount.checked_mul(self.nanos_per_unit())
    }

    /// Returns the suffix used in labels for this unit.
    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Formats bucket boundaries with a fixed digit width and unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueFormatter {
    max: u64,
    width: usize,
    factor: i64,
    suffix: &'static str,
}

impl ValueFormatter {
    const fn new(max: u64, width: usize, factor: i64, suffix: &'static str) -> Self {
        Self { max, width, factor, suffix }
    }

    /// Exclusive upper limit of the maxima this formatter is selected for.
    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Number of digits in a formatted value.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Unit suffix appended to a formatted value.
    pub const fn suffix(&self) -> &'static str {
        self.suffix
    }

    /// Formats `value`, truncated to this formatter's unit.
    pub fn format(&self, value: i64) -> String {
        format!("{:0width$}{}", value / self.factor, self.suffix, width = self.width)
    }
}

const fn time(max: i64, width: usize, factor: i64, suffix: &'static str) -> ValueFormatter {
    ValueFormatter::new(max as u64, width, factor, suffix)
}

static TIME_FORMATTERS: [ValueFormatter; 27] = [
    time(10 * NANOS, 1, NANOS, "ns"),
    time(100 * NANOS, 2, NANOS, "ns"),
    time(MICROS, 3, NANOS, "ns"),
    time(8 * MICROS, 4, NANOS, "ns"),
    time(10 * MICROS, 1, MICROS, "us"),
    time(100 * MICROS, 2, MICROS, "us"),
    time(MILLIS, 3, MICROS, "us"),
    time(8 * MILLIS, 4, MICROS, "us"),
    time(10 * MILLIS, 1, MILLIS, "ms"),
    time(100 * MILLIS, 2, MILLIS, "ms"),
    time(SECONDS, 3, MILLIS, "ms"),
    time(8 * SECONDS, 4, MILLIS, "ms"),
    time(10 * SECONDS, 1, SECONDS, "s"),
    time(100 * SECONDS, 2, SECONDS, "s"),
    time(8 * MINUTES, 4, SECONDS, "s"),
    time(10 * MINUTES, 1, MINUTES, "min"),
    time(100 * MINUTES, 2, MINUTES, "min"),
    time(8 * HOURS, 3, MINUTES, "min"),
    time(10 * HOURS, 1, HOURS, "h"),
    time(100 * HOURS, 2, HOURS, "h"),
    time(8 * DAYS, 3, HOURS, "h"),
    time(10 * DAYS, 1, DAYS, "d"),
    time(100 * DAYS, 2, DAYS, "d"),
    time(1_000 * DAYS, 3, DAYS, "d"),
    time(10_000 * DAYS, 4, DAYS, "d"),
    time(100_000 * DAYS, 5, DAYS, "d"),
    time(i64::MAX, 6, DAYS, "d"),
];

// Four formatters per unit, with thresholds of 10, 100, 1000 and 10000 units.
const fn scaled_formatters(base: u64, suffixes: [&'static str; 6]) -> [ValueFormatter; 24] {
    let mut formatters = [ValueFormatter::new(0, 0, 1, ""); 24];
    let mut factor = 1u64;
    let mut unit = 0;
    while unit < suffixes.len() {
        let mut threshold = 10u64;
        let mut width = 1;
        while width <= 4 {
            formatters[unit * 4 + width - 1] =
                ValueFormatter::new(threshold * factor, width, factor as i64, suffixes[unit]);
            threshold *= 10;
            width += 1;
        }
        factor *= base;
        unit += 1;
    }
    formatters
}

static BINARY_FORMATTERS: [ValueFormatter; 24] =
    scaled_formatters(1024, ["_B", "_KiB", "_MiB", "_GiB", "_TiB", "_PiB"]);

static DECIMAL_FORMATTERS: [ValueFormatter; 24] =
    scaled_formatters(1000, ["", "_k", "_M", "_G", "_T", "_P"]);

/// Returns the formatters used for time-based bucket functions, ordered by threshold.
pub fn time_formatters() -> &'static [ValueFormatter] {
    &TIME_FORMATTERS
}

/// Returns the formatters used for [`bytes`], ordered by threshold.
pub fn binary_formatters() -> &'static [ValueFormatter] {
    &BINARY_FORMATTERS
}

/// Returns the formatters used for [`decimal`], ordered by threshold.
pub fn decimal_formatters() -> &'static [ValueFormatter] {
    &DECIMAL_FORMATTERS
}

fn select(formatters: &'static [ValueFormatter], max: i64) -> &'static ValueFormatter {
    let max = max as u64;
    formatters
        .iter()
        .find(|formatter| max < formatter.max)
        .unwrap_or(&formatters[formatters.len() - 1])
}

#[derive(Clone, Copy)]
enum Bias {
    Zero,
    Max,
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    value / divisor + i64::from(value % divisor != 0)
}

// Integer boundaries such that `amount <= boundary` matches the real-valued comparison.
fn boundaries(max: i64, bias: Bias) -> [i64; 4] {
    match bias {
        Bias::Zero => [max / 8, max / 4, max / 2, max],
        Bias::Max => [
            max - ceil_div(max, 2),
            max - ceil_div(max, 4),
            max - ceil_div(max, 8),
            max,
        ],
    }
}

/// A generated bucket function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledBuckets {
    boundaries: [i64; 4],
    labels: [String; 4],
    underflow: &'static str,
    overflow: &'static str,
}

impl LabeledBuckets {
    fn new(
        boundaries: [i64; 4],
        formatter: &ValueFormatter,
        underflow: &'static str,
        overflow: &'static str,
    ) -> Self {
        let labels = boundaries.map(|boundary| formatter.format(boundary));
        Self { boundaries, labels, underflow, overflow }
    }

    /// Returns the label of the bucket `amount` falls into.
    ///
    /// Negative amounts map to the underflow label, and amounts above the maximum map to the
    /// overflow label.
    pub fn bucket(&self, amount: i64) -> &str {
        if amount < 0 {
            return self.underflow;
        }

        self.boundaries
            .iter()
            .zip(self.labels.iter())
            .find(|(boundary, _)| amount <= **boundary)
            .map_or(self.overflow, |(_, label)| label.as_str())
    }

    /// Upper boundaries of the numeric buckets, in ascending order.
    pub fn boundaries(&self) -> &[i64] {
        &self.boundaries
    }

    /// Labels of the numeric buckets, in the same order as [`boundaries`](Self::boundaries).
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label used for negative amounts.
    pub fn underflow_label(&self) -> &'static str {
        self.underflow
    }

    /// Label used for amounts above the maximum.
    pub fn overflow_label(&self) -> &'static str {
        self.overflow
    }
}

impl BucketFn for LabeledBuckets {
    fn bucket(&self, amount: i64) -> &str {
        LabeledBuckets::bucket(self, amount)
    }
}

fn positive(max: i64) -> Result<i64, BucketError> {
    if max <= 0 {
        return Err(BucketError::NonPositiveMaximum { max });
    }
    Ok(max)
}

fn time_buckets(
    max: i64,
    unit: TimeUnit,
    bias: Bias,
    underflow: &'static str,
    overflow: &'static str,
) -> Result<LabeledBuckets, BucketError> {
    let max = positive(max)?;
    let max_nanos =
        unit.to_nanos(max).ok_or(BucketError::Overflow { max, unit: unit.suffix() })?;
    let formatter = select(&TIME_FORMATTERS, max_nanos);
    Ok(LabeledBuckets::new(boundaries(max_nanos, bias), formatter, underflow, overflow))
}

/// Buckets for the age of data, such as the time since an item was last refreshed.
///
/// Amounts are in nanoseconds.  Negative amounts are labeled `future` and amounts above `max` are
/// labeled `old`.
///
/// # Errors
///
/// Fails if `max` is not positive or does not fit in nanoseconds.
pub fn age(max: i64, unit: TimeUnit) -> Result<LabeledBuckets, BucketError> {
    time_buckets(max, unit, Bias::Zero, "future", "old")
}

/// Same as [`age`], but with more resolution close to `max`.
///
/// # Errors
///
/// Fails if `max` is not positive or does not fit in nanoseconds.
pub fn age_bias_old(max: i64, unit: TimeUnit) -> Result<LabeledBuckets, BucketError> {
    time_buckets(max, unit, Bias::Max, "future", "old")
}

/// Buckets for request latencies.
///
/// Amounts are in nanoseconds.  Negative amounts are labeled `negative_latency` and amounts above
/// `max` are labeled `slow`.
///
/// # Errors
///
/// Fails if `max` is not positive or does not fit in nanoseconds.
pub fn latency(max: i64, unit: TimeUnit) -> Result<LabeledBuckets, BucketError> {
    time_buckets(max, unit, Bias::Zero, "negative_latency", "slow")
}

/// Same as [`latency`], but with more resolution close to `max`.
///
/// Useful when the interesting question is how close requests get to a timeout.
///
/// # Errors
///
/// Fails if `max` is not positive or does not fit in nanoseconds.
pub fn latency_bias_slow(max: i64, unit: TimeUnit) -> Result<LabeledBuckets, BucketError> {
    time_buckets(max, unit, Bias::Max, "negative_latency", "slow")
}

/// Buckets for sizes in bytes, labeled with binary prefixes (`_B`, `_KiB`, `_MiB`, ...).
///
/// Negative amounts are labeled `negative` and amounts above `max` are labeled `large`.
///
/// # Errors
///
/// Fails if `max` is not positive.
pub fn bytes(max: i64) -> Result<LabeledBuckets, BucketError> {
    let max = positive(max)?;
    let formatter = select(&BINARY_FORMATTERS, max);
    Ok(LabeledBuckets::new(boundaries(max, Bias::Zero), formatter, "negative", "large"))
}

/// Buckets for plain quantities, labeled with decimal prefixes (none, `_k`, `_M`, ...).
///
/// Negative amounts are labeled `negative` and amounts above `max` are labeled `large`.
///
/// # Errors
///
/// Fails if `max` is not positive.
pub fn decimal(max: i64) -> Result<LabeledBuckets, BucketError> {
    let max = positive(max)?;
    let formatter = select(&DECIMAL_FORMATTERS, max);
    Ok(LabeledBuckets::new(boundaries(max, Bias::Zero), formatter, "negative", "large"))
}
