use std::sync::Arc;

use spectator::Registry;
use tracing::{debug, error, trace, warn};

use crate::{
    protocol::{write_line, ValueFormatter},
    writer::{MemoryWriter, Writer},
};

/// Outcome of a single [`Publisher::publish`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Measurements read from the registry that were worth sending.
    pub measurements: u64,
    /// Payloads successfully handed to the writer.
    pub payloads_written: u64,
    /// Lines dropped because they did not fit in a single payload.
    pub lines_dropped: u64,
    /// Payloads the writer failed to write.
    pub write_failures: u64,
}

impl PublishStats {
    /// Returns `true` if any line or payload was lost.
    pub const fn any_failures(&self) -> bool {
        self.lines_dropped != 0 || self.write_failures != 0
    }
}

/// Reads measurements from a registry and writes them out as protocol lines.
///
/// Lines are packed, newline separated, into payloads of at most the configured maximum length, so
/// that a UDP agent receives as few datagrams as possible.
pub struct Publisher {
    registry: Arc<Registry>,
    writer: Writer,
    max_payload_len: usize,
    formatter: ValueFormatter,
    line_buf: String,
    payload_buf: String,
}

impl Publisher {
    pub(crate) fn new(registry: Arc<Registry>, writer: Writer, max_payload_len: usize) -> Self {
        Self {
            registry,
            writer,
            max_payload_len,
            formatter: ValueFormatter::new(),
            line_buf: String::new(),
            payload_buf: String::with_capacity(max_payload_len),
        }
    }

    /// The registry this publisher reads from.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The in-memory buffer lines are written to, if the output location is `memory`.
    pub fn memory(&self) -> Option<&MemoryWriter> {
        self.writer.as_memory()
    }

    /// Reads and resets every meter of the registry, and writes out what is worth sending.
    pub fn publish(&mut self) -> PublishStats {
        let mut stats = PublishStats::default();

        for measurement in self.registry.measurements() {
            if !measurement.should_send() {
                continue;
            }
            stats.measurements += 1;

            self.line_buf.clear();
            write_line(&mut self.line_buf, &mut self.formatter, &measurement);

            if self.line_buf.len() > self.max_payload_len {
                warn!(
                    line_len = self.line_buf.len(),
                    max_payload_len = self.max_payload_len,
                    id = %measurement.id(),
                    "Dropping line longer than the maximum payload length."
                );
                stats.lines_dropped += 1;
                continue;
            }

            // The separator counts towards the payload length.
            let separator_len = usize::from(!self.payload_buf.is_empty());
            if self.payload_buf.len() + separator_len + self.line_buf.len() > self.max_payload_len {
                self.flush_payload(&mut stats);
            }

            if !self.payload_buf.is_empty() {
                self.payload_buf.push('\n');
            }
            self.payload_buf.push_str(&self.line_buf);
        }

        self.flush_payload(&mut stats);

        debug!(
            measurements = stats.measurements,
            payloads_written = stats.payloads_written,
            lines_dropped = stats.lines_dropped,
            write_failures = stats.write_failures,
            "Finished publishing."
        );
        stats
    }

    fn flush_payload(&mut self, stats: &mut PublishStats) {
        if self.payload_buf.is_empty() {
            return;
        }

        trace!(payload_len = self.payload_buf.len(), "Writing payload.");
        match self.writer.write(&self.payload_buf) {
            Ok(()) => stats.payloads_written += 1,
            Err(e) => {
                error!(error = %e, "Failed to write payload.");
                stats.write_failures += 1;
            }
        }
        self.payload_buf.clear();
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("writer", &self.writer)
            .field("max_payload_len", &self.max_payload_len)
            .finish_non_exhaustive()
    }
}
