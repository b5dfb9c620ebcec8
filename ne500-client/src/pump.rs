//! Device session: per-pump operations over one gateway connection
//!
//! Every operation is a strict write-then-read exchange. The pump network is
//! half-duplex, so no command goes out before the reply to the previous one
//! has been read and classified.
//!
//! Device-level rejections (`?`, `?NA`, `?OOR`, ...) and alarms are normal
//! protocol outcomes and come back as an [`Outcome`], not as an `Err`.
//! Transport faults (timeouts, framing errors, a closed socket) are returned
//! as `Err` unchanged.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! # async fn demo() -> ne500_core::PumpResult<()> {
//! use ne500_client::{PumpSession, SessionSettings};
//! use ne500_transport::{TcpSettings, TcpTransport, TransportLayer};
//!
//! let mut transport = TcpTransport::new(TcpSettings::new("192.168.0.2", 100));
//! transport.open().await?;
//!
//! let mut session = PumpSession::new(&mut transport, SessionSettings::with_pumps(2));
//! session.infuse(1, 0.02).await?.into_result()?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use ne500_core::{
    Address, AlarmCode, Command, CommandErrorKind, Direction, DispensedVolume, PumpAddress, PumpError,
    PumpResult, PumpStatus, Verb,
};
use ne500_session::{classify, format, format_burst, Frame, FrameReader, FrameSettings, Reply};
use ne500_transport::StreamAccessor;
use std::fmt;

/// Settings of a device session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Pumps on the network, addressed `1..=npumps`
    pub npumps: u8,
    pub frame: FrameSettings,
}

impl SessionSettings {
    pub fn with_pumps(npumps: u8) -> Self {
        Self {
            npumps,
            ..Self::default()
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            npumps: 1,
            frame: FrameSettings::default(),
        }
    }
}

/// One completed request/reply pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Command text as sent, without the terminator
    pub request: String,
    pub frame: Frame,
    pub reply: Reply,
}

/// Result of an exchange the pump answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The pump accepted the command
    Accepted(Exchange),
    /// The pump answered with a command error
    Rejected {
        exchange: Exchange,
        kind: CommandErrorKind,
    },
    /// The pump answered with an alarm
    Alarm { exchange: Exchange, code: AlarmCode },
}

impl Outcome {
    fn from_exchange(exchange: Exchange) -> Self {
        match exchange.reply {
            Reply::CommandError { kind, .. } => Outcome::Rejected { exchange, kind },
            Reply::Alarm(code) => Outcome::Alarm { exchange, code },
            _ => Outcome::Accepted(exchange),
        }
    }

    pub fn exchange(&self) -> &Exchange {
        match self {
            Outcome::Accepted(exchange)
            | Outcome::Rejected { exchange, .. }
            | Outcome::Alarm { exchange, .. } => exchange,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    /// Prompt status of the reply, if it carried one
    pub fn status(&self) -> Option<PumpStatus> {
        self.exchange().reply.status()
    }

    /// Turn a rejection or alarm into the matching [`PumpError`]
    pub fn into_result(self) -> PumpResult<Exchange> {
        match self {
            Outcome::Accepted(exchange) => Ok(exchange),
            Outcome::Rejected { exchange, kind } => Err(PumpError::CommandRejected {
                command: exchange.request,
                kind,
            }),
            Outcome::Alarm { exchange, code } => Err(PumpError::Alarm {
                address: exchange.frame.address(),
                code,
            }),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exchange = self.exchange();
        write!(f, "{:?} -> {}", exchange.request, exchange.reply)
    }
}

/// Pump operations over a borrowed transport
///
/// The session never opens or closes the connection; the transport's owner
/// does.
pub struct PumpSession<'a, T: StreamAccessor + ?Sized> {
    transport: &'a mut T,
    reader: FrameReader,
    npumps: u8,
}

impl<'a, T: StreamAccessor + ?Sized> PumpSession<'a, T> {
    pub fn new(transport: &'a mut T, settings: SessionSettings) -> Self {
        Self {
            transport,
            reader: FrameReader::new(settings.frame),
            npumps: settings.npumps,
        }
    }

    pub fn npumps(&self) -> u8 {
        self.npumps
    }

    /// Frame reader, mainly for its statistics
    pub fn reader(&self) -> &FrameReader {
        &self.reader
    }

    pub fn transport(&mut self) -> &mut T {
        &mut *self.transport
    }

    /// Check `1 <= pump <= npumps`
    pub fn pump_address(&self, pump: u8) -> PumpResult<PumpAddress> {
        PumpAddress::in_network(pump, self.npumps)
    }

    /// Infuse `volume` on `pump`: `DIR INF`, `VOL`, `RUN`
    ///
    /// Stops at the first exchange the pump does not accept and returns it.
    pub async fn infuse(&mut self, pump: u8, volume: f64) -> PumpResult<Outcome> {
        self.pump_volume(pump, Direction::Infuse, volume).await
    }

    /// Withdraw `volume` on `pump`: `DIR WDR`, `VOL`, `RUN`
    pub async fn withdraw(&mut self, pump: u8, volume: f64) -> PumpResult<Outcome> {
        self.pump_volume(pump, Direction::Withdraw, volume).await
    }

    async fn pump_volume(&mut self, pump: u8, direction: Direction, volume: f64) -> PumpResult<Outcome> {
        let address = self.pump_address(pump)?;
        let commands = [
            Command::direction(address, direction),
            Command::quantity(address, Verb::Vol, volume)?,
            Command::bare(address, Verb::Run),
        ];
        self.send_all(&commands).await
    }

    /// Stop the pumping program; valid in any pump state
    pub async fn stop(&mut self, pump: u8) -> PumpResult<Outcome> {
        let address = self.pump_address(pump)?;
        self.exchange(&Command::bare(address, Verb::Stp)).await
    }

    /// Reset the pump network
    ///
    /// Sent through `pump`'s channel as `"<pump> * RESET"`, but the pumps
    /// apply it network-wide: every pump on the gateway returns to factory
    /// parameters, not just the addressed one.
    pub async fn reset(&mut self, pump: u8) -> PumpResult<Outcome> {
        let address = self.pump_address(pump)?;
        log::warn!("Resetting pump network through pump {}; all pumps are affected", address);
        self.exchange(&Command::bare(address, Verb::Reset)).await
    }

    /// Current prompt status of `pump`
    ///
    /// Sends the `DIS` query; every reply starts with the prompt letter.
    pub async fn status(&mut self, pump: u8) -> PumpResult<PumpStatus> {
        let address = self.pump_address(pump)?;
        let exchange = self.exchange(&Command::bare(address, Verb::Dis)).await?.into_result()?;
        exchange.reply.status().ok_or_else(|| {
            PumpError::Framing(format!("reply {:?} carries no prompt status", exchange.frame.body_str()))
        })
    }

    /// Volume dispensed by `pump` since the counters were last cleared
    pub async fn dispensed(&mut self, pump: u8) -> PumpResult<DispensedVolume> {
        let address = self.pump_address(pump)?;
        let exchange = self.exchange(&Command::bare(address, Verb::Dis)).await?.into_result()?;
        match &exchange.reply {
            Reply::Data { payload, .. } => DispensedVolume::parse(payload),
            other => Err(PumpError::Framing(format!("expected DIS data, got {}", other))),
        }
    }

    /// Zero the dispensed counter for one direction
    pub async fn clear_dispensed(&mut self, pump: u8, direction: Direction) -> PumpResult<Outcome> {
        let address = self.pump_address(pump)?;
        let command = Command::new(address, Verb::Cld, Some(direction.as_str()))?;
        self.exchange(&command).await
    }

    pub async fn set_rate(&mut self, pump: u8, rate: f64) -> PumpResult<Outcome> {
        self.set_quantity(pump, Verb::Rat, rate).await
    }

    /// Set the syringe inside diameter in mm, which also selects the volume units
    pub async fn set_diameter(&mut self, pump: u8, diameter: f64) -> PumpResult<Outcome> {
        self.set_quantity(pump, Verb::Dia, diameter).await
    }

    pub async fn set_volume(&mut self, pump: u8, volume: f64) -> PumpResult<Outcome> {
        self.set_quantity(pump, Verb::Vol, volume).await
    }

    pub async fn set_direction(&mut self, pump: u8, direction: Direction) -> PumpResult<Outcome> {
        let address = self.pump_address(pump)?;
        self.exchange(&Command::direction(address, direction)).await
    }

    async fn set_quantity(&mut self, pump: u8, verb: Verb, value: f64) -> PumpResult<Outcome> {
        let address = self.pump_address(pump)?;
        self.exchange(&Command::quantity(address, verb, value)?).await
    }

    /// Switch the network into or out of dual mode
    ///
    /// Enabling sends `* ADR DUAL`; disabling gives every pump back the
    /// single address `home` with `* ADR <home>`.
    pub async fn set_dual_mode(&mut self, home: u8, enabled: bool) -> PumpResult<Outcome> {
        let home = self.pump_address(home)?;
        let param = if enabled { "DUAL".to_string() } else { home.to_string() };
        let command = Command::new(Address::Broadcast, Verb::Adr, Some(&param))?;
        self.exchange(&command).await
    }

    /// Send an arbitrary command
    pub async fn execute(&mut self, command: &Command) -> PumpResult<Outcome> {
        if let Some(pump) = command.pump() {
            self.pump_address(pump.value())?;
        }
        self.exchange(command).await
    }

    /// Send several commands one exchange at a time, stopping at the first
    /// that is not accepted
    pub async fn send_all(&mut self, commands: &[Command]) -> PumpResult<Outcome> {
        let mut last = None;
        for command in commands {
            let outcome = self.execute(command).await?;
            if !outcome.is_accepted() {
                return Ok(outcome);
            }
            last = Some(outcome);
        }
        last.ok_or_else(|| PumpError::InvalidParameter("no commands to send".to_string()))
    }

    /// Send a network command burst as a single exchange
    pub async fn burst(&mut self, commands: &[Command]) -> PumpResult<Outcome> {
        for command in commands {
            if let Some(pump) = command.pump() {
                self.pump_address(pump.value())?;
            }
        }
        let data = format_burst(commands)?;
        self.round_trip(data).await
    }

    async fn exchange(&mut self, command: &Command) -> PumpResult<Outcome> {
        self.round_trip(format(command)).await
    }

    async fn round_trip(&mut self, data: Bytes) -> PumpResult<Outcome> {
        let request = String::from_utf8_lossy(&data).trim_end().to_string();

        let stale = self.transport.discard_pending().await? + self.reader.buffered();
        if stale > 0 {
            log::debug!("Discarded {} stale byte(s) before {:?}", stale, request);
        }
        self.reader.reset();

        let sent = self.transport.write(&data).await?;
        if sent != data.len() {
            return Err(PumpError::Connection(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("{:?} sent only {} of {} bytes", request, sent, data.len()),
            )));
        }
        let frame = self.reader.read_frame(&mut *self.transport).await?;
        let reply = classify(&frame);

        let outcome = Outcome::from_exchange(Exchange { request, frame, reply });
        match &outcome {
            Outcome::Accepted(_) => log::debug!("{}", outcome),
            Outcome::Rejected { .. } => log::warn!("Command rejected: {}", outcome),
            Outcome::Alarm { .. } => log::warn!("Pump alarm: {}", outcome),
        }
        Ok(outcome)
    }
}
