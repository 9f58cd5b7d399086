//! Publishes the measurements of a [`spectator`] registry to a local agent.
//!
//! # Usage
//!
//! ```no_run
//! # use std::{sync::Arc, time::Duration};
//! # use spectator::Registry;
//! # use spectator_exporter::ExporterBuilder;
//! let registry = Arc::new(Registry::default());
//!
//! // Publish to the agent on `udp://127.0.0.1:1234` every five seconds, until `exporter` is dropped.
//! let exporter = ExporterBuilder::default().spawn(Arc::clone(&registry)).expect("failed to spawn exporter");
//!
//! registry.counter("server.requests", [("status", "200")]).increment();
//!
//! // Stopping publishes whatever was recorded since the last flush.
//! exporter.stop();
//! ```
//!
//! For tests, the `memory` location keeps lines in memory, and [`ExporterBuilder::build`] returns
//! a [`Publisher`] to be driven by hand:
//!
//! ```
//! # use std::sync::Arc;
//! # use spectator::Registry;
//! # use spectator_exporter::ExporterBuilder;
//! let registry = Arc::new(Registry::default());
//! let mut publisher = ExporterBuilder::default()
//!     .with_env_override(false)
//!     .with_location("memory")?
//!     .build(Arc::clone(&registry))?;
//!
//! registry.counter("server.requests", [("status", "200")]).increment();
//! publisher.publish();
//!
//! let lines = publisher.memory().expect("memory location").lines();
//! assert_eq!(lines, vec!["c:server.requests,statistic=count,status=200:1".to_string()]);
//! # Ok::<(), spectator_exporter::BuildError>(())
//! ```
//!
//! # Output locations
//!
//! | location             | destination                                   |
//! |----------------------|-----------------------------------------------|
//! | `none`               | discarded                                     |
//! | `memory`             | an in-memory [`MemoryWriter`]                 |
//! | `stdout` / `stderr`  | standard streams                              |
//! | `udp`                | the local agent on `127.0.0.1:1234`           |
//! | `file://<path>`      | appended to a file                            |
//! | `udp://<host>:<port>`| any UDP endpoint                              |
//!
//! The `SPECTATOR_OUTPUT_LOCATION` environment variable overrides the configured location.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, ExporterBuilder, ExporterHandle};

mod location;
pub use self::location::{Location, ENV_OUTPUT_LOCATION};

pub mod protocol;
pub use self::protocol::ParseError;

mod publisher;
pub use self::publisher::{PublishStats, Publisher};

mod writer;
pub use self::writer::{MemoryWriter, Writer};
