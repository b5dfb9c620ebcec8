//! Scripted in-memory transport
//!
//! Replies are queued up front and released one script entry per write, the
//! way a pump only answers after it has received a command. Every write and
//! read is recorded so tests can check the half-duplex ordering.

use crate::stream::{ReadLength, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use ne500_core::{PumpError, PumpResult};
use std::collections::VecDeque;
use std::io;

/// One piece of a scripted reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Bytes that arrive back to back
    Data(Vec<u8>),
    /// A pause long enough for one poll to time out
    Gap,
}

/// Recorded transport activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(Vec<u8>),
    Read(Vec<u8>),
    ReadTimeout,
}

/// In-memory [`StreamAccessor`] driven by a reply script
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: VecDeque<Vec<Chunk>>,
    pending: VecDeque<Chunk>,
    events: Vec<Event>,
    connected: bool,
    unwritable: bool,
    write_limit: Option<usize>,
}

impl ScriptedTransport {
    /// A connected transport with an empty script
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Queue a reply released by the next unanswered write
    pub fn reply(&mut self, bytes: &[u8]) -> &mut Self {
        self.script.push_back(vec![Chunk::Data(bytes.to_vec())]);
        self
    }

    /// Queue a reply made of several chunks, possibly separated by gaps
    pub fn reply_chunks(&mut self, chunks: Vec<Chunk>) -> &mut Self {
        self.script.push_back(chunks);
        self
    }

    /// Queue a write that receives no reply at all
    pub fn silence(&mut self) -> &mut Self {
        self.script.push_back(Vec::new());
        self
    }

    /// Bytes already waiting before any command is sent
    pub fn push_unsolicited(&mut self, bytes: &[u8]) -> &mut Self {
        self.pending.push_back(Chunk::Data(bytes.to_vec()));
        self
    }

    /// Make every following write time out
    pub fn set_unwritable(&mut self, unwritable: bool) {
        self.unwritable = unwritable;
    }

    /// Accept at most `limit` bytes per write and report the short count,
    /// like a transport that does not finish its sends
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Everything written so far, as text
    pub fn written(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Write(data) => Some(String::from_utf8_lossy(data).into_owned()),
                _ => None,
            })
            .collect()
    }

    /// Script entries not yet consumed by a write
    pub fn remaining_replies(&self) -> usize {
        self.script.len()
    }

    fn not_connected() -> PumpError {
        PumpError::Connection(io::Error::new(io::ErrorKind::NotConnected, "scripted transport closed"))
    }

    /// Pop the next byte, or `None` if a gap or the end of input is reached
    fn next_byte(&mut self) -> Option<u8> {
        loop {
            match self.pending.front_mut() {
                Some(Chunk::Data(data)) if data.is_empty() => {
                    self.pending.pop_front();
                }
                Some(Chunk::Data(data)) => return Some(data.remove(0)),
                Some(Chunk::Gap) => {
                    self.pending.pop_front();
                    return None;
                }
                None => return None,
            }
        }
    }
}

#[async_trait]
impl StreamAccessor for ScriptedTransport {
    async fn write(&mut self, data: &[u8]) -> PumpResult<usize> {
        if !self.connected {
            return Err(Self::not_connected());
        }
        if self.unwritable {
            return Err(PumpError::WriteTimeout { attempts: 1 });
        }
        let accepted = self.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        self.events.push(Event::Write(data[..accepted].to_vec()));
        if let Some(reply) = self.script.pop_front() {
            self.pending.extend(reply);
        }
        Ok(accepted)
    }

    async fn read(&mut self, length: ReadLength) -> PumpResult<Vec<u8>> {
        if !self.connected {
            return Err(Self::not_connected());
        }
        let mut buf = Vec::new();
        match length {
            ReadLength::Exact(count) => {
                while buf.len() < count {
                    match self.next_byte() {
                        Some(byte) => buf.push(byte),
                        None => {
                            self.events.push(Event::ReadTimeout);
                            return Err(PumpError::ReadTimeout {
                                attempts: 1,
                                received: buf.len(),
                            });
                        }
                    }
                }
            }
            ReadLength::UntilIdle { max } => {
                while buf.len() < max {
                    match self.next_byte() {
                        Some(byte) => buf.push(byte),
                        None => break,
                    }
                }
            }
        }
        if !buf.is_empty() {
            self.events.push(Event::Read(buf.clone()));
        }
        Ok(buf)
    }

    async fn discard_pending(&mut self) -> PumpResult<usize> {
        let mut discarded = 0;
        while let Some(Chunk::Data(data)) = self.pending.front() {
            discarded += data.len();
            self.pending.pop_front();
        }
        Ok(discarded)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> PumpResult<()> {
        self.connected = false;
        Ok(())
    }
}

#[async_trait]
impl TransportLayer for ScriptedTransport {
    async fn open(&mut self) -> PumpResult<()> {
        if self.connected {
            return Err(PumpError::Connection(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "scripted transport already open",
            )));
        }
        self.connected = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_follow_writes() {
        let mut transport = ScriptedTransport::new();
        transport.reply(b"\x0201S\x03");

        // nothing is released before the command goes out
        assert!(transport.read(ReadLength::UntilIdle { max: 64 }).await.unwrap().is_empty());

        transport.write(b"01 DIS\r").await.unwrap();
        let reply = transport.read(ReadLength::UntilIdle { max: 64 }).await.unwrap();
        assert_eq!(reply, b"\x0201S\x03");
        assert_eq!(transport.written(), vec!["01 DIS\r".to_string()]);
    }

    #[tokio::test]
    async fn test_gap_ends_idle_read() {
        let mut transport = ScriptedTransport::new();
        transport.reply_chunks(vec![Chunk::Data(b"ab".to_vec()), Chunk::Gap, Chunk::Data(b"c".to_vec())]);
        transport.write(b"x").await.unwrap();

        assert_eq!(transport.read(ReadLength::UntilIdle { max: 64 }).await.unwrap(), b"ab");
        assert_eq!(transport.read(ReadLength::Exact(1)).await.unwrap(), b"c");
        assert!(matches!(
            transport.read(ReadLength::Exact(1)).await,
            Err(PumpError::ReadTimeout { received: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_idle_read_stops_at_ceiling() {
        let mut transport = ScriptedTransport::new();
        transport.reply(&[b'x'; 100]);
        transport.write(b"x").await.unwrap();

        assert_eq!(transport.read(ReadLength::UntilIdle { max: 10 }).await.unwrap().len(), 10);
        assert_eq!(transport.read(ReadLength::UntilIdle { max: 200 }).await.unwrap().len(), 90);
    }

    #[tokio::test]
    async fn test_discard_and_close() {
        let mut transport = ScriptedTransport::new();
        transport.push_unsolicited(b"junk");
        assert_eq!(transport.discard_pending().await.unwrap(), 4);

        transport.close().await.unwrap();
        assert!(transport.write(b"01 STP\r").await.is_err());
        transport.open().await.unwrap();
        assert!(transport.is_connected());
    }
}
