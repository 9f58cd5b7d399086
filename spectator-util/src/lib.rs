//! Numeric building blocks used by spectator meters.
//!
//! This crate holds the pieces of the meter family that carry actual algorithms, kept apart from
//! any registry or exporter so they can be tested and benchmarked on their own:
//!
//! - [`percentile_buckets`]: a fixed table of 276 exponentially spaced bucket boundaries covering
//!   the full non-negative `i64` range, a classifier mapping a value to its bucket, and an
//!   estimator that reconstructs approximate percentiles from per-bucket counts.
//! - [`bucket_functions`]: generators for small, human-readable bucket schemes over durations,
//!   byte sizes and decimal quantities, whose labels sort lexicographically in numeric order.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

pub mod bucket_functions;
pub use bucket_functions::{BucketError, BucketFn, LabeledBuckets, TimeUnit};

pub mod percentile_buckets;
