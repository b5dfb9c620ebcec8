//! Stream accessor trait for transport layer

use async_trait::async_trait;
use ne500_core::PumpResult;

/// How much a single [`StreamAccessor::read`] should collect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLength {
    /// Collect exactly this many bytes, one at a time so a frame boundary is
    /// never overrun. Fails with `ReadTimeout` once the retry budget is spent.
    Exact(usize),
    /// Collect until a poll yields no data or `max` bytes have arrived and
    /// return what arrived, possibly nothing. The first idle gap is treated
    /// as the end of the burst.
    UntilIdle { max: usize },
}

/// Stream accessor interface to the pump network gateway
///
/// Implementations are half-duplex byte pipes: one caller owns the stream and
/// never issues a write while a reply is still expected.
#[async_trait]
pub trait StreamAccessor: Send {
    /// Write all of `data`, polling for writability
    ///
    /// Either every byte is sent or an error is returned; a timeout after a
    /// short send still fails with `WriteTimeout`.
    ///
    /// # Returns
    ///
    /// Number of bytes sent, always `data.len()`
    async fn write(&mut self, data: &[u8]) -> PumpResult<usize>;

    /// Read from the stream
    ///
    /// # Arguments
    ///
    /// * `length` - fixed byte count or read-until-idle
    async fn read(&mut self, length: ReadLength) -> PumpResult<Vec<u8>>;

    /// Drop bytes that are already waiting without blocking
    ///
    /// Used before a new exchange so a stale reply is never taken as the answer
    /// to the next command.
    ///
    /// # Returns
    ///
    /// Number of bytes discarded
    async fn discard_pending(&mut self) -> PumpResult<usize>;

    /// Check if the stream is connected
    fn is_connected(&self) -> bool;

    /// Close the stream; a no-op when already closed
    async fn close(&mut self) -> PumpResult<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the connection using the configured settings
    async fn open(&mut self) -> PumpResult<()>;
}

/// Render raw protocol bytes for logs, escaping control characters
///
/// `STX`/`ETX` are shown as `<STX>`/`<ETX>`, carriage return and line feed as
/// `\r`/`\n`, other non-printable bytes as `\xNN`.
pub fn escape_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &byte in data {
        match byte {
            0x02 => out.push_str("<STX>"),
            0x03 => out.push_str("<ETX>"),
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            0x20..=0x7E => out.push(byte as char),
            other => out.push_str(&format!("\\x{:02X}", other)),
        }
    }
    out
}
