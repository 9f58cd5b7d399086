//! Bucket boundaries and percentile estimation for percentile meters.
//!
//! The boundaries grow exponentially with roughly three buckets per power of two, starting at 1 and
//! ending at `i64::MAX`.  The resolution is fine enough for real-world latencies and sizes while
//! keeping the total number of buckets, and so the worst-case number of counters a single
//! percentile meter can create, bounded at [`LENGTH`].
//!
//! The table is generated at compile time with exact integer arithmetic, so it is shared by every
//! meter in the process without any initialization or synchronization.

/// Number of buckets in the table.
pub const LENGTH: usize = 276;

/// Largest value that can be classified.
pub const MAX_VALUE: i64 = i64::MAX;

const MAX_INDEX: usize = LENGTH - 1;

// Values up to this one map to their own index without searching.
const IDENTITY_LIMIT: i64 = 15;

// Exponent step between bucket groups: two bits of magnitude per group.
const DIGITS: u32 = 2;

static BUCKET_VALUES: [i64; LENGTH] = build_bucket_values();

const fn build_bucket_values() -> [i64; LENGTH] {
    let mut values = [0i64; LENGTH];
    values[0] = 1;
    values[1] = 2;
    values[2] = 3;
    let mut idx = 3;

    // The group for exponent 62 would need 2^64 as its upper bound, and is covered by the final
    // `i64::MAX` bucket instead.
    let mut exp = DIGITS;
    while exp < 62 {
        let mut current: i64 = 1 << exp;
        let delta = current / 3;
        let next = (current << DIGITS) - delta;
        while current < next {
            values[idx] = current;
            idx += 1;
            current += delta;
        }
        exp += DIGITS;
    }

    values[idx] = MAX_VALUE;
    assert!(idx == MAX_INDEX, "bucket table size does not match LENGTH");
    values
}

/// Returns the number of buckets.
pub const fn length() -> usize {
    LENGTH
}

/// Returns the upper boundary of the bucket at `idx`.
///
/// # Panics
///
/// Panics if `idx` is not less than [`LENGTH`].
pub fn get(idx: usize) -> i64 {
    BUCKET_VALUES[idx]
}

/// Returns every bucket boundary, in ascending order.
pub fn values() -> &'static [i64] {
    &BUCKET_VALUES
}

/// Returns the index of the bucket that `v` falls into.
///
/// This is the smallest index whose boundary is greater than or equal to `v`.  Values of zero or
/// less map to the first bucket, and values up to 15 map to the index equal to themselves.
pub fn index_of(v: i64) -> usize {
    if v <= 0 {
        return 0;
    }
    if v <= IDENTITY_LIMIT {
        return v as usize;
    }

    let start = IDENTITY_LIMIT as usize;
    let offset = BUCKET_VALUES[start..].partition_point(|&boundary| boundary < v);
    (start + offset).min(MAX_INDEX)
}

/// Returns the upper boundary of the bucket that `v` falls into.
///
/// The boundary can be used as an approximation of `v` that is always greater than or equal to it.
pub fn bucket(v: i64) -> i64 {
    BUCKET_VALUES[index_of(v)]
}

/// Computes approximate percentiles from a set of per-bucket counts.
///
/// `counts` holds the number of observations per bucket, indexed the same way as the bucket table,
/// and may be shorter than [`LENGTH`].  Entries past [`LENGTH`] have no bucket and are ignored.
/// `pcts` holds the requested percentiles in the range
/// `[0, 100]`, which must be sorted in ascending order.  The estimate for each percentile is
/// written to the same position in `results`.
///
/// Values are assumed to be spread uniformly within a bucket, so the estimate is interpolated
/// linearly between the upper boundary of the previous bucket and the upper boundary of the bucket
/// containing the percentile.
///
/// If there are no observations at all, every result is `NaN`.  Percentiles that can never be
/// reached, such as those above 100, are also left as `NaN`.
///
/// # Panics
///
/// Panics if `pcts` and `results` have different lengths.
pub fn percentiles(counts: &[u64], pcts: &[f64], results: &mut [f64]) {
    assert_eq!(pcts.len(), results.len(), "percentiles and results must have the same length");
    results.fill(f64::NAN);

    let total: u64 = counts.iter().take(LENGTH).sum();
    if total == 0 {
        return;
    }
    let total = total as f64;

    let mut pct_idx = 0;
    let mut prev = 0u64;
    let mut prev_p = 0.0;
    let mut prev_b = 0.0;
    for (&count, &boundary) in counts.iter().zip(BUCKET_VALUES.iter()) {
        let next = prev + count;
        let next_p = 100.0 * next as f64 / total;
        let next_b = boundary as f64;

        // An empty bucket has no width in percentile space, so it cannot resolve anything.
        if count > 0 {
            while pct_idx < pcts.len() && next_p >= pcts[pct_idx] {
                let f = (pcts[pct_idx] - prev_p) / (next_p - prev_p);
                results[pct_idx] = prev_b + f * (next_b - prev_b);
                pct_idx += 1;
            }
        }
        if pct_idx >= pcts.len() {
            break;
        }

        prev = next;
        prev_p = next_p;
        prev_b = next_b;
    }
}

/// Computes a single approximate percentile from a set of per-bucket counts.
///
/// See [`percentiles`] for details.
pub fn percentile(counts: &[u64], p: f64) -> f64 {
    let mut result = [f64::NAN];
    percentiles(counts, &[p], &mut result);
    result[0]
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::{bucket, get, index_of, length, percentile, percentiles, values, LENGTH};

    fn uniform_counts(n: i64) -> Vec<u64> {
        let mut counts = vec![0u64; LENGTH];
        for i in 0..n {
            counts[index_of(i)] += 1;
        }
        counts
    }

    #[test]
    fn table_shape() {
        assert_eq!(length(), 276);
        assert_eq!(values().len(), LENGTH);
        assert_eq!(&values()[..3], &[1, 2, 3]);
        assert_eq!(get(LENGTH - 1), i64::MAX);

        for pair in values().windows(2) {
            assert!(pair[0] < pair[1], "boundaries out of order: {:?}", pair);
        }
    }

    #[test]
    fn table_tail_matches_published_values() {
        let tail = [
            66_052_794_534_767_272,
            72_057_594_037_927_936,
            96_076_792_050_570_581,
            120_095_990_063_213_226,
            144_115_188_075_855_871,
            168_134_386_088_498_516,
            192_153_584_101_141_161,
            216_172_782_113_783_806,
            240_191_980_126_426_451,
            264_211_178_139_069_096,
            288_230_376_151_711_744,
            384_307_168_202_282_325,
            480_383_960_252_852_906,
            576_460_752_303_423_487,
            672_537_544_353_994_068,
            768_614_336_404_564_649,
            864_691_128_455_135_230,
            960_767_920_505_705_811,
            1_056_844_712_556_276_392,
            1_152_921_504_606_846_976,
            1_537_228_672_809_129_301,
            1_921_535_841_011_411_626,
            2_305_843_009_213_693_951,
            2_690_150_177_415_976_276,
            3_074_457_345_618_258_601,
            3_458_764_513_820_540_926,
            3_843_071_682_022_823_251,
            4_227_378_850_225_105_576,
            i64::MAX,
        ];
        assert_eq!(&values()[LENGTH - tail.len()..], &tail[..]);
    }

    #[test]
    fn index_of_small_values() {
        assert_eq!(index_of(-1), 0);
        assert_eq!(index_of(i64::MIN), 0);
        for v in 0..=15 {
            assert_eq!(index_of(v), v as usize);
        }
    }

    #[test]
    fn index_of_known_values() {
        let cases = [
            (16, 15),
            (21, 15),
            (22, 16),
            (31, 17),
            (87, 25),
            (1_020, 41),
            (10_000, 55),
            (100_000, 70),
            (1_000_000, 86),
            (10_000_000, 100),
            (100_000_000, 115),
            (1_000_000_000, 131),
            (10_000_000_000, 144),
            (100_000_000_000, 160),
            (1_000_000_000_000, 175),
            (i64::MAX - 1, LENGTH - 1),
            (i64::MAX, LENGTH - 1),
        ];

        for (v, expected) in cases {
            assert_eq!(index_of(v), expected, "index_of({})", v);
        }
    }

    #[test]
    fn exact_boundaries_map_to_their_own_index() {
        for (idx, &boundary) in values().iter().enumerate().skip(15) {
            assert_eq!(index_of(boundary), idx);
            assert_eq!(bucket(boundary), boundary);
        }
    }

    #[test]
    fn bucket_is_never_below_value() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..10_000 {
            let v = rng.random_range(0..100_000_000_000_000i64);
            assert!(v <= bucket(v), "bucket({}) = {}", v, bucket(v));
        }
    }

    #[test]
    fn uniform_percentiles() {
        let counts = uniform_counts(100_000);
        let pcts = [0.0, 25.0, 50.0, 75.0, 90.0, 95.0, 98.0, 99.0, 99.5, 100.0];
        let mut results = [0.0; 10];
        percentiles(&counts, &pcts, &mut results);

        for (p, actual) in pcts.iter().zip(results.iter()) {
            let expected = p * 1_000.0;
            let threshold = 0.1 * expected;
            assert!(
                (expected - actual).abs() <= threshold,
                "expected p{} to be near {} but got {}",
                p,
                expected,
                actual
            );
        }
    }

    #[test]
    fn percentile_of_empty_counts_is_nan() {
        let counts = vec![0u64; LENGTH];
        assert!(percentile(&counts, 50.0).is_nan());
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn percentile_skips_leading_empty_buckets() {
        let mut counts = vec![0u64; LENGTH];
        counts[index_of(1_000)] = 10;

        let lower = get(index_of(1_000) - 1) as f64;
        let upper = get(index_of(1_000)) as f64;
        approx::assert_relative_eq!(percentile(&counts, 0.0), lower);
        approx::assert_relative_eq!(percentile(&counts, 100.0), upper);
        approx::assert_relative_eq!(percentile(&counts, 50.0), (lower + upper) / 2.0);
    }

    #[test]
    fn counts_past_the_table_are_ignored() {
        let mut counts = uniform_counts(10);
        let expected = percentile(&counts, 100.0);
        counts.extend([5, 5]);

        let p100 = percentile(&counts, 100.0);
        assert!(!p100.is_nan());
        approx::assert_relative_eq!(p100, expected);
    }

    #[test]
    fn unreachable_percentiles_are_nan() {
        let counts = uniform_counts(10);
        let mut results = [0.0; 2];
        percentiles(&counts, &[50.0, 101.0], &mut results);
        assert!(!results[0].is_nan());
        assert!(results[1].is_nan());
    }

    proptest! {
        #[test]
        fn index_of_is_monotonic(a in any::<i64>(), b in any::<i64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(index_of(lo) <= index_of(hi));
        }

        #[test]
        fn bucket_covers_value(v in 0..=i64::MAX) {
            let idx = index_of(v);
            prop_assert!(idx < LENGTH);
            prop_assert!(get(idx) >= v);
        }

        #[test]
        fn percentiles_are_ordered(samples in proptest::collection::vec(0..1_000_000_000i64, 1..512)) {
            let mut counts = vec![0u64; LENGTH];
            for v in &samples {
                counts[index_of(*v)] += 1;
            }

            let pcts = [0.0, 10.0, 50.0, 90.0, 99.0, 100.0];
            let mut results = [0.0; 6];
            percentiles(&counts, &pcts, &mut results);
            for pair in results.windows(2) {
                prop_assert!(pair[0] <= pair[1], "{:?}", results);
            }
        }
    }
}
