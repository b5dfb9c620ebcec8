//! TCP transport to a pump network gateway

use crate::stream::{escape_bytes, ReadLength, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use ne500_core::{PumpError, PumpResult};
use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Wrapper for TcpStream that implements Debug
struct DebugTcpStream(TcpStream);

impl fmt::Debug for DebugTcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpStream").finish()
    }
}

impl Deref for DebugTcpStream {
    type Target = TcpStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugTcpStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Read/write polling parameters
#[derive(Debug, Clone)]
pub struct IoSettings {
    /// How long one readiness poll waits
    pub timeout: Duration,
    /// Pause after a read poll that yielded nothing
    pub sleep_on_timeout: Duration,
    /// Polls that may time out before a read or write gives up
    pub max_timeout_retries: u32,
    /// Log every exchanged byte at `info` instead of `trace`
    pub verbose: bool,
}

impl Default for IoSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10),
            sleep_on_timeout: Duration::from_millis(10),
            max_timeout_retries: 1,
            verbose: false,
        }
    }
}

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub io: IoSettings,
}

impl TcpSettings {
    /// Create new TCP settings with default timeouts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(1),
            io: IoSettings::default(),
        }
    }

    /// Create TCP settings with a connect timeout
    pub fn with_timeout(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::new(host, port)
        }
    }
}

/// TCP transport layer implementation
///
/// Owns at most one live socket. Reads and writes poll for readiness with the
/// configured timeout and give up after `max_timeout_retries` empty polls.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<DebugTcpStream>,
    settings: TcpSettings,
    peer: Option<SocketAddr>,
    cancel: Option<CancellationToken>,
}

impl TcpTransport {
    /// Create a new, disconnected TCP transport
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            peer: None,
            cancel: None,
        }
    }

    /// Stop polling as soon as `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    /// Replace the polling parameters, e.g. to lengthen timeouts for a slow gateway
    pub fn set_io_settings(&mut self, io: IoSettings) {
        self.settings.io = io;
    }

    /// Address of the connected gateway
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Connect to a gateway
    ///
    /// Disables Nagle's algorithm so short command lines leave immediately.
    ///
    /// # Errors
    ///
    /// * `Connection` with `AlreadyExists` if a socket is already open
    /// * `ConnectTimeout` if the gateway does not accept within `connect_timeout`;
    ///   the half-open socket is discarded and the transport stays disconnected
    pub async fn connect(&mut self, host: &str, port: u16, connect_timeout: Duration) -> PumpResult<()> {
        if self.stream.is_some() {
            return Err(PumpError::Connection(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Attempt to connect an already connected transport ({:?})", self.peer),
            )));
        }

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| PumpError::ConnectTimeout(connect_timeout))??;
        stream.set_nodelay(true)?;

        self.peer = stream.peer_addr().ok();
        self.stream = Some(DebugTcpStream(stream));
        log::debug!("Connected to pump gateway {}:{}", host, port);
        Ok(())
    }

    /// Shut the socket down in both directions and close it
    ///
    /// Idempotent: a second call finds no socket and does nothing.
    pub async fn disconnect(&mut self) -> PumpResult<()> {
        if let Some(stream) = self.stream.take() {
            let peer = self.peer.take();
            let std_stream = stream.0.into_std()?;
            if let Err(e) = std_stream.shutdown(Shutdown::Both) {
                if e.kind() != io::ErrorKind::NotConnected {
                    return Err(e.into());
                }
            }
            drop(std_stream);
            log::debug!("Disconnected from pump gateway {:?}", peer);
        }
        Ok(())
    }

    fn check_cancelled(&self) -> PumpResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(PumpError::Cancelled),
            _ => Ok(()),
        }
    }

    fn stream_mut(&mut self) -> PumpResult<&mut DebugTcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            PumpError::Connection(io::Error::new(
                io::ErrorKind::NotConnected,
                "TCP stream not connected",
            ))
        })
    }

    fn log_traffic(&self, direction: &str, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.settings.io.verbose {
            log::info!("{} ({:?}): {}", direction, self.peer, escape_bytes(data));
        } else {
            log::trace!("{} ({:?}): {}", direction, self.peer, escape_bytes(data));
        }
    }

    /// Wait up to `timeout` for one byte
    ///
    /// Returns `None` when the poll times out with nothing to read.
    async fn poll_byte(&mut self, timeout: Duration) -> PumpResult<Option<u8>> {
        let deadline = Instant::now() + timeout;
        let stream = self.stream_mut()?;
        loop {
            match tokio::time::timeout_at(deadline, stream.readable()).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(())) => {
                    let mut byte = [0u8; 1];
                    match stream.try_read(&mut byte) {
                        Ok(0) => {
                            return Err(PumpError::Connection(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "Gateway closed the connection",
                            )));
                        }
                        Ok(_) => return Ok(Some(byte[0])),
                        // spurious readiness, keep waiting until the deadline
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> PumpResult<()> {
        let host = self.settings.host.clone();
        let port = self.settings.port;
        let connect_timeout = self.settings.connect_timeout;
        self.connect(&host, port, connect_timeout).await
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn write(&mut self, data: &[u8]) -> PumpResult<usize> {
        let io = self.settings.io.clone();
        let mut timeouts = 0;
        let mut sent = 0;

        // a short send keeps going with the same timeout budget
        while sent < data.len() {
            self.check_cancelled()?;
            let stream = self.stream_mut()?;
            match tokio::time::timeout(io.timeout, stream.writable()).await {
                Ok(Ok(())) => match stream.try_write(&data[sent..]) {
                    Ok(0) => {
                        return Err(PumpError::Connection(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "Gateway accepted no bytes",
                        )));
                    }
                    Ok(n) => {
                        self.log_traffic("SENT", &data[sent..sent + n]);
                        sent += n;
                        continue;
                    }
                    // readiness was stale; wait again
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e.into()),
                },
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {}
            }

            timeouts += 1;
            if timeouts >= io.max_timeout_retries {
                log::debug!("Write gave up after {} of {} bytes", sent, data.len());
                return Err(PumpError::WriteTimeout { attempts: timeouts });
            }
        }
        Ok(sent)
    }

    async fn read(&mut self, length: ReadLength) -> PumpResult<Vec<u8>> {
        let io = self.settings.io.clone();

        let received = match length {
            ReadLength::Exact(0) => return Ok(Vec::new()),
            ReadLength::Exact(count) => {
                let mut buf = Vec::with_capacity(count);
                let mut timeouts = 0;
                while buf.len() < count {
                    self.check_cancelled()?;
                    match self.poll_byte(io.timeout).await? {
                        Some(byte) => buf.push(byte),
                        None => {
                            timeouts += 1;
                            if timeouts >= io.max_timeout_retries {
                                self.log_traffic("RECEIVED (partial)", &buf);
                                return Err(PumpError::ReadTimeout {
                                    attempts: timeouts,
                                    received: buf.len(),
                                });
                            }
                            tokio::time::sleep(io.sleep_on_timeout).await;
                        }
                    }
                }
                buf
            }
            ReadLength::UntilIdle { max } => {
                let mut buf = Vec::new();
                while buf.len() < max {
                    self.check_cancelled()?;
                    match self.poll_byte(io.timeout).await? {
                        Some(byte) => buf.push(byte),
                        None => break,
                    }
                }
                buf
            }
        };

        self.log_traffic("RECEIVED", &received);
        Ok(received)
    }

    async fn discard_pending(&mut self) -> PumpResult<usize> {
        let stream = self.stream_mut()?;
        let mut scratch = [0u8; 64];
        let mut discarded = Vec::new();
        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => discarded.extend_from_slice(&scratch[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        if !discarded.is_empty() {
            log::debug!("Discarded stale bytes from {:?}: {}", self.peer, escape_bytes(&discarded));
        }
        Ok(discarded.len())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> PumpResult<()> {
        self.disconnect().await
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            log::warn!(
                "TcpTransport to {:?} dropped while connected; call close() to shut down cleanly",
                self.peer
            );
        }
    }
}
