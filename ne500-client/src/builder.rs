//! Connection builder for NE-500 pump networks
//!
//! # Usage Example
//!
//! ```rust,no_run
//! # async fn demo() -> ne500_core::PumpResult<()> {
//! use ne500_client::ConnectionBuilder;
//! use std::time::Duration;
//!
//! let mut network = ConnectionBuilder::new()
//!     .tcp("192.168.0.2", 100)
//!     .io_timeout(Duration::from_millis(20))
//!     .npumps(2)
//!     .build()?;
//!
//! network.open().await?;
//! network.session().stop(1).await?;
//! network.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::NetworkConfig;
use crate::network::PumpNetwork;
use crate::pump::SessionSettings;
use crate::sequencer::SequencerSettings;
use ne500_core::{PumpError, PumpResult, MAX_PUMP_ADDRESS};
use ne500_session::{FrameSettings, FramingMode};
use ne500_transport::{IoSettings, TcpSettings, TcpTransport};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builder for a [`PumpNetwork`]
///
/// Collects transport, framing, session and sequencer settings; everything
/// except the gateway address has a default matching the usual gateway
/// setup (10 ms polls, one retry, one pump).
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    /// Gateway host and port
    gateway: Option<(String, u16)>,
    connect_timeout: Duration,
    io: IoSettings,
    frame: FrameSettings,
    npumps: u8,
    sequencer: SequencerSettings,
    cancel: Option<CancellationToken>,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self {
            gateway: None,
            connect_timeout: Duration::from_secs(1),
            io: IoSettings::default(),
            frame: FrameSettings::default(),
            npumps: 1,
            sequencer: SequencerSettings::default(),
            cancel: None,
        }
    }

    /// Start from a loaded configuration
    pub fn from_config(config: &NetworkConfig) -> PumpResult<Self> {
        config.validate()?;
        let tcp = config.tcp_settings()?;
        Ok(Self {
            gateway: Some((tcp.host, tcp.port)),
            connect_timeout: tcp.connect_timeout,
            io: tcp.io,
            frame: config.frame_settings(),
            npumps: config.npumps,
            sequencer: config.sequencer_settings()?,
            cancel: None,
        })
    }

    /// Gateway address
    pub fn tcp(mut self, host: &str, port: u16) -> Self {
        self.gateway = Some((host.to_string(), port));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Timeout of one read/write readiness poll
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io.timeout = timeout;
        self
    }

    pub fn sleep_on_timeout(mut self, pause: Duration) -> Self {
        self.io.sleep_on_timeout = pause;
        self
    }

    pub fn max_timeout_retries(mut self, retries: u32) -> Self {
        self.io.max_timeout_retries = retries;
        self
    }

    /// Log exchanged bytes at `info` level
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.io.verbose = verbose;
        self
    }

    pub fn framing(mut self, mode: FramingMode) -> Self {
        self.frame.mode = mode;
        self
    }

    pub fn max_frame_attempts(mut self, attempts: u32) -> Self {
        self.frame.max_attempts = attempts;
        self
    }

    pub fn npumps(mut self, npumps: u8) -> Self {
        self.npumps = npumps;
        self
    }

    pub fn max_status_polls(mut self, polls: u32) -> Self {
        self.sequencer.max_status_polls = polls;
        self
    }

    pub fn status_poll_interval(mut self, interval: Duration) -> Self {
        self.sequencer.poll_interval = interval;
        self
    }

    pub fn repoll_between_cycles(mut self, repoll: bool) -> Self {
        self.sequencer.repoll_between_cycles = repoll;
        self
    }

    pub fn dual_mode_setup(mut self, enabled: bool) -> Self {
        self.sequencer.dual_mode_setup = enabled;
        self
    }

    /// Cancel transport polls and sequencer runs through `token`
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the (not yet connected) network
    ///
    /// # Errors
    /// `Config` if no gateway was set, `InvalidAddress` if `npumps` is not
    /// between 1 and 99, `InvalidParameter` for a zero attempt ceiling.
    pub fn build(self) -> PumpResult<PumpNetwork> {
        let (host, port) = self
            .gateway
            .ok_or_else(|| PumpError::Config("gateway address must be configured".to_string()))?;
        if self.npumps == 0 || self.npumps > MAX_PUMP_ADDRESS {
            return Err(PumpError::InvalidAddress(format!(
                "network size {} outside 1..={}",
                self.npumps, MAX_PUMP_ADDRESS
            )));
        }
        if self.frame.max_attempts == 0 || self.sequencer.max_status_polls == 0 {
            return Err(PumpError::InvalidParameter(
                "frame attempts and status polls must be at least 1".to_string(),
            ));
        }

        let settings = TcpSettings {
            host,
            port,
            connect_timeout: self.connect_timeout,
            io: self.io,
        };
        let mut transport = TcpTransport::new(settings);
        if let Some(token) = &self.cancel {
            transport = transport.with_cancellation(token.clone());
        }
        let session = SessionSettings {
            npumps: self.npumps,
            frame: self.frame,
        };
        Ok(PumpNetwork::new(transport, session, self.sequencer, self.cancel))
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_gateway() {
        assert!(matches!(ConnectionBuilder::new().build(), Err(PumpError::Config(_))));
    }

    #[test]
    fn test_build_validates_network_size() {
        let builder = ConnectionBuilder::new().tcp("127.0.0.1", 100);
        assert!(builder.clone().npumps(0).build().is_err());
        assert!(builder.clone().npumps(100).build().is_err());
        assert!(builder.clone().max_frame_attempts(0).build().is_err());
        assert!(builder.npumps(2).build().is_ok());
    }

    #[test]
    fn test_build_carries_settings() {
        let mut network = ConnectionBuilder::new()
            .tcp("10.0.0.7", 4001)
            .io_timeout(Duration::from_millis(25))
            .max_timeout_retries(4)
            .framing(FramingMode::Newline)
            .npumps(3)
            .build()
            .unwrap();

        assert!(!network.is_open());
        assert_eq!(network.session_settings().npumps, 3);
        assert_eq!(network.session_settings().frame.mode, FramingMode::Newline);

        let tcp = network.transport().settings().clone();
        assert_eq!(tcp.host, "10.0.0.7");
        assert_eq!(tcp.port, 4001);
        assert_eq!(tcp.io.timeout, Duration::from_millis(25));
        assert_eq!(tcp.io.max_timeout_retries, 4);
    }

    #[test]
    fn test_from_config() {
        let config = NetworkConfig {
            host: "192.168.0.6".to_string(),
            npumps: 2,
            repoll_between_cycles: true,
            ..NetworkConfig::default()
        };
        let network = ConnectionBuilder::from_config(&config).unwrap().build().unwrap();
        assert!(network.sequencer().settings().repoll_between_cycles);
        assert_eq!(network.session_settings().npumps, 2);
    }
}
