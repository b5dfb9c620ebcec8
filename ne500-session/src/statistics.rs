//! Framing statistics collection

/// Frame reader statistics
///
/// Tracks how often the reader had to wait or resynchronise, which is the
/// first thing to look at when a gateway link is flaky.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStatistics {
    /// Total number of frames returned
    pub frames_read: u64,
    /// Bytes dropped while looking for a frame boundary
    pub bytes_discarded: u64,
    /// Number of times the buffer was realigned on a new frame start
    pub resyncs: u64,
    /// Read attempts that produced no data
    pub read_timeouts: u64,
    /// Calls that ended with a framing error
    pub framing_errors: u64,
}

impl FrameStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_frames_read(&mut self) {
        self.frames_read += 1;
    }

    /// Record a resynchronisation that dropped `bytes` bytes
    pub fn record_discard(&mut self, bytes: usize) {
        self.resyncs += 1;
        self.bytes_discarded += bytes as u64;
    }

    pub fn increment_read_timeouts(&mut self) {
        self.read_timeouts += 1;
    }

    pub fn increment_framing_errors(&mut self) {
        self.framing_errors += 1;
    }

    /// Percentage of read calls that failed to produce a frame
    ///
    /// Returns 0.0 if nothing has been read yet.
    pub fn error_rate(&self) -> f64 {
        let total = self.frames_read + self.framing_errors;
        if total == 0 {
            0.0
        } else {
            (self.framing_errors as f64 / total as f64) * 100.0
        }
    }
}
