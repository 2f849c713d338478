use std::io::Read;

use tracing::{debug, warn};

use crate::error::FrameError;
use crate::hex::HexBytes;
use crate::reader::FrameReader;
use crate::scratch::ScratchBuffer;

/// Smallest scratch buffer a flusher will drain with.
pub const MIN_FLUSH_CAPACITY: usize = 1024;

/// Default cap on frame reads per flush.
pub const DEFAULT_FLUSH_LIMIT: usize = 256;

/// Outcome of one [`Flusher::flush`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Frame reads issued, the terminating empty read included.
    pub reads: usize,
    /// Stale frames discarded.
    pub frames: usize,
    /// Reads that failed and were discarded.
    pub errors: usize,
    /// Whether the device reported an empty queue before the read limit.
    pub drained: bool,
}

/// Drains unsolicited frames from the device queue.
///
/// Run before every transaction so a late response to an earlier request is
/// never taken for the answer to the next one.
#[derive(Debug)]
pub struct Flusher {
    buffer: ScratchBuffer,
    limit: usize,
}

impl Flusher {
    /// A flusher with a [`MIN_FLUSH_CAPACITY`] buffer and [`DEFAULT_FLUSH_LIMIT`] reads.
    pub fn new() -> Self {
        Self::with_capacity(MIN_FLUSH_CAPACITY)
    }

    /// A flusher with at least `capacity` bytes of private scratch space.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: ScratchBuffer::new(capacity.max(MIN_FLUSH_CAPACITY)),
            limit: DEFAULT_FLUSH_LIMIT,
        }
    }

    /// Cap the number of frame reads per flush. Zero is treated as one.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Capacity of the private scratch buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Read and discard frames until the device reports an empty queue.
    ///
    /// Frames and read errors are logged and dropped. The loop also stops
    /// after the configured read limit so a device stuck on a frame it cannot
    /// release (e.g. one larger than the scratch buffer) cannot hang the caller.
    pub fn flush<B: Read>(&mut self, bus: &mut B) -> FlushReport {
        let mut reader = FrameReader::new(bus);
        let mut report = FlushReport::default();

        while report.reads < self.limit {
            self.buffer.reset();
            report.reads += 1;
            match reader.read_frame(&mut self.buffer) {
                Ok(frame) => {
                    report.frames += 1;
                    debug!(
                        size = frame.len(),
                        bytes = %HexBytes(frame.payload()),
                        "discarding stale frame"
                    );
                }
                Err(FrameError::NoData) => {
                    report.drained = true;
                    break;
                }
                Err(err) => {
                    report.errors += 1;
                    warn!(error = %err, "discarding read error while flushing");
                }
            }
        }

        if !report.drained {
            warn!(
                reads = report.reads,
                frames = report.frames,
                errors = report.errors,
                "flush limit reached before device queue emptied"
            );
        } else if report.frames > 0 || report.errors > 0 {
            debug!(
                frames = report.frames,
                errors = report.errors,
                "flushed stale frames"
            );
        }

        report
    }
}

impl Default for Flusher {
    fn default() -> Self {
        Self::new()
    }
}
