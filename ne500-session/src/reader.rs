//! Frame reader
//!
//! Pulls bytes from a [`StreamAccessor`] until one complete reply frame is
//! buffered. Replies may arrive split over several socket reads, so a partial
//! buffer is kept across attempts; the number of attempts and the buffer size
//! are both bounded so a desynchronised stream ends in an error instead of
//! spinning forever.

use crate::frame::{trim_ascii, Frame, FramingMode, ETX, LF, STX};
use crate::statistics::FrameStatistics;
use bytes::{Buf, BytesMut};
use ne500_core::{PumpError, PumpResult};
use ne500_transport::{escape_bytes, ReadLength, StreamAccessor};

/// Frame reader parameters
#[derive(Debug, Clone)]
pub struct FrameSettings {
    pub mode: FramingMode,
    /// Newline framing: shorter lines are treated as noise
    pub min_frame_len: usize,
    /// Read attempts per frame before giving up
    pub max_attempts: u32,
    /// Buffered bytes without a frame before giving up
    pub max_frame_len: usize,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            mode: FramingMode::StxEtx,
            min_frame_len: 5,
            max_attempts: 10,
            max_frame_len: 256,
        }
    }
}

impl FrameSettings {
    pub fn with_mode(mode: FramingMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Assembles reply frames from a byte stream
#[derive(Debug)]
pub struct FrameReader {
    settings: FrameSettings,
    buffer: BytesMut,
    statistics: FrameStatistics,
}

impl FrameReader {
    pub fn new(settings: FrameSettings) -> Self {
        Self {
            settings,
            buffer: BytesMut::with_capacity(64),
            statistics: FrameStatistics::new(),
        }
    }

    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    pub fn statistics(&self) -> &FrameStatistics {
        &self.statistics
    }

    /// Number of bytes held back from previous reads
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Forget any partially received frame
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            self.statistics.record_discard(self.buffer.len());
            self.buffer.clear();
        }
    }

    /// Read one complete frame
    ///
    /// Each attempt waits for a first byte with the transport's retry budget
    /// and then drains the rest of the burst until the line goes idle or the
    /// buffer passes `max_frame_len`, so a peer that never pauses still ends
    /// in an error.
    ///
    /// # Errors
    ///
    /// * `ReadTimeout` if nothing at all arrived within `max_attempts`
    /// * `Framing` if bytes arrived but never formed a frame, or the buffer
    ///   outgrew `max_frame_len`; the unusable bytes are dropped
    /// * any other transport error unchanged
    pub async fn read_frame<T>(&mut self, transport: &mut T) -> PumpResult<Frame>
    where
        T: StreamAccessor + ?Sized,
    {
        let mut attempts = 0;
        loop {
            if let Some(frame) = self.try_extract() {
                self.statistics.increment_frames_read();
                return Ok(frame);
            }

            if self.buffer.len() > self.settings.max_frame_len {
                return Err(self.framing_error(format!(
                    "no frame within {} bytes",
                    self.settings.max_frame_len
                )));
            }

            if attempts >= self.settings.max_attempts {
                if self.buffer.is_empty() {
                    return Err(PumpError::ReadTimeout { attempts, received: 0 });
                }
                return Err(self.framing_error(format!("no complete frame after {} read attempts", attempts)));
            }
            attempts += 1;

            match transport.read(ReadLength::Exact(1)).await {
                Ok(first) => {
                    self.buffer.extend_from_slice(&first);
                    // one byte past the ceiling is enough to tell an oversized frame
                    let max = (self.settings.max_frame_len + 1).saturating_sub(self.buffer.len());
                    let rest = transport.read(ReadLength::UntilIdle { max }).await?;
                    self.buffer.extend_from_slice(&rest);
                }
                Err(PumpError::ReadTimeout { .. }) => {
                    self.statistics.increment_read_timeouts();
                    log::trace!("Frame read attempt {} timed out", attempts);
                }
                Err(e) => {
                    self.buffer.clear();
                    return Err(e);
                }
            }
        }
    }

    fn framing_error(&mut self, reason: String) -> PumpError {
        let junk = self.buffer.split();
        self.statistics.increment_framing_errors();
        self.statistics.record_discard(junk.len());
        PumpError::Framing(format!("{}: {}", reason, escape_bytes(&junk)))
    }

    fn discard(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        log::debug!("Resynchronising, dropping {}", escape_bytes(&self.buffer[..count]));
        self.statistics.record_discard(count);
        self.buffer.advance(count);
    }

    /// Take the first complete frame out of the buffer, if there is one
    fn try_extract(&mut self) -> Option<Frame> {
        match self.settings.mode {
            FramingMode::StxEtx => self.extract_stx_etx(),
            FramingMode::Newline => self.extract_line(),
        }
    }

    fn extract_stx_etx(&mut self) -> Option<Frame> {
        loop {
            let end = self.buffer.iter().position(|&b| b == ETX)?;

            // The frame starts at the STX closest to the ETX; anything before
            // it belongs to an earlier frame that lost its end marker.
            let Some(start) = self.buffer[..end].iter().rposition(|&b| b == STX) else {
                self.discard(end + 1);
                continue;
            };
            self.discard(start);

            let end = end - start;
            if trim_ascii(&self.buffer[1..end]).is_empty() {
                self.discard(end + 1);
                continue;
            }

            let raw = self.buffer.split_to(end + 1).freeze();
            let body = raw.slice_ref(trim_ascii(&raw[1..end]));
            return Some(Frame::new(raw, body));
        }
    }

    fn extract_line(&mut self) -> Option<Frame> {
        loop {
            let end = self.buffer.iter().position(|&b| b == LF)?;
            let line = &self.buffer[..=end];
            let body = trim_ascii(line);
            let body = body.strip_prefix(&[STX]).unwrap_or(body);
            let body = body.strip_suffix(&[ETX]).unwrap_or(body);

            if line.len() < self.settings.min_frame_len || trim_ascii(body).is_empty() {
                self.discard(end + 1);
                continue;
            }

            let raw = self.buffer.split_to(end + 1).freeze();
            let body = {
                let trimmed = trim_ascii(&raw);
                let trimmed = trimmed.strip_prefix(&[STX]).unwrap_or(trimmed);
                let trimmed = trimmed.strip_suffix(&[ETX]).unwrap_or(trimmed);
                raw.slice_ref(trim_ascii(trimmed))
            };
            return Some(Frame::new(raw, body));
        }
    }
}
