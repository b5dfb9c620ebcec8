//! Reply frames

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Start of text, opens a framed reply
pub const STX: u8 = 0x02;
/// End of text, closes a framed reply
pub const ETX: u8 = 0x03;
/// Command terminator
pub const CR: u8 = b'\r';
/// Reply terminator in newline framing
pub const LF: u8 = b'\n';

/// How the gateway firmware delimits replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// `STX ... ETX` framed replies
    #[default]
    StxEtx,
    /// Legacy firmware: free text terminated by a line feed
    Newline,
}

/// One complete reply unit
///
/// `raw` holds the bytes exactly as received, markers included; `body` holds
/// the content between the markers (or before the line terminator) with
/// surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Bytes,
    body: Bytes,
}

impl Frame {
    /// Build a frame from its raw bytes and body
    pub fn new(raw: Bytes, body: Bytes) -> Self {
        Self { raw, body }
    }

    /// Build a frame from body text only, e.g. for tests or replays
    pub fn from_body(body: &str) -> Self {
        let body = Bytes::copy_from_slice(body.trim().as_bytes());
        Self {
            raw: body.clone(),
            body,
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text; non-ASCII bytes are replaced
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Address of the replying pump, from the leading two digits of the body
    pub fn address(&self) -> Option<u8> {
        match self.body.get(..2) {
            Some([a, b]) if a.is_ascii_digit() && b.is_ascii_digit() => {
                Some((a - b'0') * 10 + (b - b'0'))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body_str())
    }
}

/// Trim ASCII whitespace (including CR/LF) from both ends of a byte slice
pub(crate) fn trim_ascii(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &data[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_address() {
        assert_eq!(Frame::from_body("01S").address(), Some(1));
        assert_eq!(Frame::from_body("12I").address(), Some(12));
        assert_eq!(Frame::from_body("S").address(), None);
        assert_eq!(Frame::from_body("1S").address(), None);
    }

    #[test]
    fn test_trim_ascii() {
        assert_eq!(trim_ascii(b"\r\n 00S \r\n"), b"00S");
        assert_eq!(trim_ascii(b"\r\n"), b"");
        assert_eq!(trim_ascii(b""), b"");
    }
}
