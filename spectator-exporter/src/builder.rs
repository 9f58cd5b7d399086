use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use spectator::Registry;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{location::Location, publisher::Publisher, writer::Writer};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_PAYLOAD_LEN: usize = 8192;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

// Shortest line the protocol can produce, `c:a:1`.
const SMALLEST_VALID_PAYLOAD_LEN: usize = 5;

/// Errors that could occur while building an exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The output location could not be parsed.
    #[error("invalid output location '{location}': {reason}")]
    InvalidLocation {
        /// The offending location.
        location: String,
        /// Details about the parsing failure.
        reason: String,
    },

    /// The maximum payload length cannot hold any line.
    #[error("maximum payload length {max_payload_len} is too small (must be {min} or greater)")]
    PayloadLengthTooSmall {
        /// The configured length.
        max_payload_len: usize,
        /// The smallest accepted length.
        min: usize,
    },

    /// The writer for the output location could not be opened.
    #[error("failed to open writer for {location}: {source}")]
    Writer {
        /// The output location.
        location: Location,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to spawn the background thread.
    #[error("failed to spawn background thread for exporter")]
    Backend,
}

/// Builder for an exporter.
#[derive(Debug)]
pub struct ExporterBuilder {
    location: Location,
    env_override: bool,
    write_timeout: Duration,
    max_payload_len: usize,
    flush_interval: Duration,
}

impl ExporterBuilder {
    /// Set the output location.
    ///
    /// The location can be `none`, `memory`, `stdout`, `stderr`, `udp` (the local agent on
    /// `127.0.0.1:1234`), `file://<path>` or `udp://<host>:<port>`.  When the
    /// `SPECTATOR_OUTPUT_LOCATION` environment variable is set, it overrides this value.
    ///
    /// Defaults to `udp`.
    ///
    /// # Errors
    ///
    /// If the given location cannot be parsed, an error is returned.
    pub fn with_location<L>(mut self, location: L) -> Result<Self, BuildError>
    where
        L: AsRef<str>,
    {
        self.location = location.as_ref().parse()?;
        Ok(self)
    }

    /// Sets whether the `SPECTATOR_OUTPUT_LOCATION` environment variable may override the location.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_env_override(mut self, env_override: bool) -> Self {
        self.env_override = env_override;
        self
    }

    /// Set the write timeout for UDP payloads.
    ///
    /// When the write timeout is reached, the payload being sent is dropped without retrying.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum payload length.
    ///
    /// Lines are packed into payloads no longer than this.  A single line longer than this is dropped.
    ///
    /// Defaults to 8192 bytes.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Set the flush interval of the background thread.
    ///
    /// Defaults to 5 seconds.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    fn resolve_location(&self) -> Result<Location, BuildError> {
        if self.env_override {
            self.location.clone().or_env_override()
        } else {
            Ok(self.location.clone())
        }
    }

    /// Builds a publisher for `registry`, to be driven manually.
    ///
    /// # Errors
    ///
    /// If the maximum payload length is too small, the environment override is invalid, or the writer
    /// cannot be opened, an error is returned.
    pub fn build(self, registry: Arc<Registry>) -> Result<Publisher, BuildError> {
        if self.max_payload_len < SMALLEST_VALID_PAYLOAD_LEN {
            return Err(BuildError::PayloadLengthTooSmall {
                max_payload_len: self.max_payload_len,
                min: SMALLEST_VALID_PAYLOAD_LEN,
            });
        }

        let location = self.resolve_location()?;
        let writer = Writer::open(&location, self.write_timeout)
            .map_err(|source| BuildError::Writer { location: location.clone(), source })?;
        debug!(%location, max_payload_len = self.max_payload_len, "Built publisher.");

        Ok(Publisher::new(registry, writer, self.max_payload_len))
    }

    /// Builds a publisher for `registry` and spawns a background thread that publishes at every
    /// flush interval.
    ///
    /// The thread publishes one last time when the returned handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// If the publisher cannot be built or the thread cannot be spawned, an error is returned.
    pub fn spawn(self, registry: Arc<Registry>) -> Result<ExporterHandle, BuildError> {
        let flush_interval = self.flush_interval;
        let publisher = self.build(registry)?;
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = std::thread::Builder::new()
            .name("spectator-exporter-publisher".to_string())
            .spawn(move || run(publisher, flush_interval, &stop_rx))
            .map_err(|_| BuildError::Backend)?;

        info!(?flush_interval, "Spawned exporter background thread.");
        Ok(ExporterHandle { stop_tx: Some(stop_tx), thread: Some(thread) })
    }
}

impl Default for ExporterBuilder {
    fn default() -> Self {
        ExporterBuilder {
            location: Location::default(),
            env_override: true,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

fn run(mut publisher: Publisher, flush_interval: Duration, stop_rx: &crossbeam_channel::Receiver<()>) {
    let mut next_flush = Instant::now() + flush_interval;
    loop {
        let timeout = next_flush.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                next_flush = Instant::now() + flush_interval;
                publisher.publish();
            }
            // Stopped explicitly, or the handle is gone.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Exporter stopping, publishing remaining measurements.");
    let stats = publisher.publish();
    if stats.any_failures() {
        warn!(?stats, "Final publish lost measurements.");
    }
}

/// Handle to a running exporter thread.
///
/// Dropping the handle stops the thread after a final publish.
#[derive(Debug)]
pub struct ExporterHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ExporterHandle {
    /// Stops the background thread and waits for its final publish to complete.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The thread may already be gone, in which case there is nothing left to signal.
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Exporter background thread panicked.");
            }
        }
    }
}

impl Drop for ExporterHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spectator::Registry;

    use super::{BuildError, ExporterBuilder};
    use crate::location::Location;

    #[test]
    fn rejects_invalid_location() {
        let result = ExporterBuilder::default().with_location("foo");
        assert!(matches!(result, Err(BuildError::InvalidLocation { .. })));
    }

    #[test]
    fn rejects_tiny_payload_length() {
        let result = ExporterBuilder::default()
            .with_env_override(false)
            .with_maximum_payload_length(4)
            .build(Arc::new(Registry::default()));
        assert!(matches!(result, Err(BuildError::PayloadLengthTooSmall { max_payload_len: 4, min: 5 })));
    }

    #[test]
    fn default_location_is_local_udp() {
        let builder = ExporterBuilder::default().with_env_override(false);
        assert_eq!(builder.resolve_location().unwrap(), Location::default());
    }

    #[test]
    fn memory_publisher() {
        let registry = Arc::new(Registry::default());
        let mut publisher = ExporterBuilder::default()
            .with_env_override(false)
            .with_location("memory")
            .unwrap()
            .build(Arc::clone(&registry))
            .unwrap();

        registry.counter("c", Vec::<(String, String)>::new()).increment();
        publisher.publish();

        let memory = publisher.memory().unwrap();
        assert_eq!(memory.last_line().as_deref(), Some("c:c,statistic=count:1"));
    }
}
