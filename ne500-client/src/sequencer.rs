//! Command-set sequencer
//!
//! Drives a full operation across one pump or a dual-pump group:
//!
//! ```text
//! Idle -> Polling(p) -> Configuring(addr, set, remaining) -> Running(cycle) -> Idle
//!                \______________________\_______________________\______-> Failed
//! ```
//!
//! The first cycle polls until every pump in the group reports `S`, sends
//! the command set and issues `RUN`. Later cycles re-issue `RUN` directly;
//! a bounded-volume run leaves the pump stopped again when it completes.
//! They re-poll only when [`SequencerSettings::repoll_between_cycles`] is set
//! or when the plan switches to a different command set for that cycle.

use crate::pump::PumpSession;
use ne500_core::{Address, Command, CommandSet, PumpAddress, PumpError, PumpResult, Verb};
use ne500_session::Frame;
use ne500_transport::StreamAccessor;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sequencer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceState {
    /// Nothing in progress (initial and final state)
    Idle,
    /// Waiting for `pump` to report idle
    Polling { pump: u8 },
    /// Sending command set `set` to `address` (a pump, or `*` for a dual
    /// group); `remaining` commands still to go
    Configuring {
        address: Address,
        set: String,
        remaining: usize,
    },
    /// Run command of cycle `cycle` (zero based) sent or in flight
    Running { cycle: u32 },
    /// The last run aborted
    Failed,
}

impl SequenceState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SequenceState::Idle)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SequenceState::Failed)
    }
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceState::Idle => write!(f, "Idle"),
            SequenceState::Polling { pump } => write!(f, "Polling({:02})", pump),
            SequenceState::Configuring { address, set, remaining } => {
                write!(f, "Configuring({}, {}, {})", address, set, remaining)
            }
            SequenceState::Running { cycle } => write!(f, "Running({})", cycle),
            SequenceState::Failed => write!(f, "Failed"),
        }
    }
}

/// Pumps driven together by one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpGroup {
    Single(u8),
    /// Two pumps run in lockstep; configuration and run commands go out
    /// once, broadcast to both
    Dual(u8, u8),
}

impl PumpGroup {
    pub fn pumps(&self) -> Vec<u8> {
        match *self {
            PumpGroup::Single(pump) => vec![pump],
            PumpGroup::Dual(first, second) => vec![first, second],
        }
    }

    pub fn is_dual(&self) -> bool {
        matches!(self, PumpGroup::Dual(..))
    }

    fn primary(&self) -> u8 {
        match *self {
            PumpGroup::Single(pump) | PumpGroup::Dual(pump, _) => pump,
        }
    }
}

/// What to run: pump group, command set(s) and cycle count
///
/// With several command sets, cycle `n` uses set `n % len`.
#[derive(Debug, Clone)]
pub struct SequencePlan {
    pub group: PumpGroup,
    pub command_sets: Vec<CommandSet>,
    pub cycles: u32,
}

impl SequencePlan {
    pub fn new(group: PumpGroup, command_set: CommandSet, cycles: u32) -> Self {
        Self {
            group,
            command_sets: vec![command_set],
            cycles,
        }
    }

    /// Alternate between several command sets, one per cycle
    pub fn alternating(group: PumpGroup, command_sets: Vec<CommandSet>, cycles: u32) -> Self {
        Self {
            group,
            command_sets,
            cycles,
        }
    }

    fn validate(&self, npumps: u8) -> PumpResult<()> {
        if self.cycles == 0 {
            return Err(PumpError::InvalidParameter("cycle count must be at least 1".to_string()));
        }
        if self.command_sets.is_empty() {
            return Err(PumpError::InvalidParameter("sequence plan has no command set".to_string()));
        }
        for set in &self.command_sets {
            set.validate()?;
        }
        for pump in self.group.pumps() {
            PumpAddress::in_network(pump, npumps)?;
        }
        if let PumpGroup::Dual(first, second) = self.group {
            if first == second {
                return Err(PumpError::InvalidAddress(format!(
                    "dual group needs two different pumps, got {:02} twice",
                    first
                )));
            }
        }
        Ok(())
    }
}

/// Sequencer parameters
#[derive(Debug, Clone)]
pub struct SequencerSettings {
    /// Status polls per pump before giving up with `SequenceTimeout`
    pub max_status_polls: u32,
    /// Pause between two status polls
    pub poll_interval: Duration,
    /// Poll for idle before every cycle, not just the first
    pub repoll_between_cycles: bool,
    /// Wrap dual-group runs in `* ADR DUAL` ... `* ADR <primary>`
    pub dual_mode_setup: bool,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            max_status_polls: 300,
            poll_interval: Duration::from_millis(200),
            repoll_between_cycles: false,
            dual_mode_setup: false,
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct SequenceReport {
    pub cycles: u32,
    /// Acknowledgement of the last `RUN`
    pub final_ack: Frame,
    /// Request/reply exchanges performed, status polls included
    pub exchanges: u32,
}

/// Command-set sequencer
#[derive(Debug)]
pub struct Sequencer {
    settings: SequencerSettings,
    state: SequenceState,
    cancel: Option<CancellationToken>,
    exchanges: u32,
}

impl Sequencer {
    pub fn new(settings: SequencerSettings) -> Self {
        Self {
            settings,
            state: SequenceState::Idle,
            cancel: None,
            exchanges: 0,
        }
    }

    /// Abort between polls and exchanges once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn settings(&self) -> &SequencerSettings {
        &self.settings
    }

    pub fn state(&self) -> &SequenceState {
        &self.state
    }

    /// Run `plan` to completion
    ///
    /// Returns the final run acknowledgement. Any error, transport or device,
    /// leaves the sequencer in [`SequenceState::Failed`]; the next call starts
    /// over from `Idle`.
    pub async fn run<T>(&mut self, session: &mut PumpSession<'_, T>, plan: &SequencePlan) -> PumpResult<SequenceReport>
    where
        T: StreamAccessor + ?Sized,
    {
        self.state = SequenceState::Idle;
        self.exchanges = 0;
        plan.validate(session.npumps())?;

        match self.run_cycles(session, plan).await {
            Ok(report) => {
                self.transition(SequenceState::Idle);
                Ok(report)
            }
            Err(e) => {
                log::warn!("Sequence aborted in {}: {}", self.state, e);
                self.transition(SequenceState::Failed);
                Err(e)
            }
        }
    }

    async fn run_cycles<T>(&mut self, session: &mut PumpSession<'_, T>, plan: &SequencePlan) -> PumpResult<SequenceReport>
    where
        T: StreamAccessor + ?Sized,
    {
        let group = plan.group;
        if !(group.is_dual() && self.settings.dual_mode_setup) {
            return self.run_plan(session, plan).await;
        }

        self.check_cancelled()?;
        self.exchanges += 1;
        session.set_dual_mode(group.primary(), true).await?.into_result()?;

        // the network leaves dual mode on every exit path
        let result = self.run_plan(session, plan).await;
        self.exchanges += 1;
        let restored = session
            .set_dual_mode(group.primary(), false)
            .await
            .and_then(|outcome| outcome.into_result().map(|_| ()));
        match (result, restored) {
            (Ok(report), Ok(())) => Ok(SequenceReport {
                exchanges: self.exchanges,
                ..report
            }),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), restored) => {
                if let Err(cleanup) = restored {
                    log::warn!("Leaving dual mode after a failed run also failed: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn run_plan<T>(&mut self, session: &mut PumpSession<'_, T>, plan: &SequencePlan) -> PumpResult<SequenceReport>
    where
        T: StreamAccessor + ?Sized,
    {
        let group = plan.group;
        let mut previous_set = None;
        let mut final_ack = None;
        for cycle in 0..plan.cycles {
            let index = cycle as usize % plan.command_sets.len();
            let set = &plan.command_sets[index];
            let reconfigure = previous_set != Some(index);

            if reconfigure || self.settings.repoll_between_cycles {
                for pump in group.pumps() {
                    self.poll_until_idle(session, pump).await?;
                }
            }
            if reconfigure {
                self.configure(session, group, set).await?;
            }

            self.check_cancelled()?;
            self.transition(SequenceState::Running { cycle });
            let run = match group {
                PumpGroup::Single(pump) => Command::bare(session.pump_address(pump)?, Verb::Run),
                PumpGroup::Dual(..) => Command::bare(Address::Broadcast, Verb::Run),
            };
            self.exchanges += 1;
            let exchange = session.execute(&run).await?.into_result()?;
            log::info!("Cycle {}/{} running ({})", cycle + 1, plan.cycles, set.name());

            final_ack = Some(exchange.frame);
            previous_set = Some(index);
        }

        let final_ack = final_ack.ok_or_else(|| PumpError::InvalidParameter("no cycle was run".to_string()))?;
        Ok(SequenceReport {
            cycles: plan.cycles,
            final_ack,
            exchanges: self.exchanges,
        })
    }

    async fn poll_until_idle<T>(&mut self, session: &mut PumpSession<'_, T>, pump: u8) -> PumpResult<()>
    where
        T: StreamAccessor + ?Sized,
    {
        self.transition(SequenceState::Polling { pump });
        let max_polls = self.settings.max_status_polls;
        for poll in 1..=max_polls {
            self.check_cancelled()?;
            self.exchanges += 1;
            let status = session.status(pump).await?;
            if status.is_idle() {
                return Ok(());
            }
            log::trace!("Pump {:02} is {} (poll {}/{})", pump, status, poll, max_polls);
            if poll < max_polls {
                self.pause().await?;
            }
        }
        Err(PumpError::SequenceTimeout {
            address: pump,
            polls: max_polls,
        })
    }

    async fn configure<T>(&mut self, session: &mut PumpSession<'_, T>, group: PumpGroup, set: &CommandSet) -> PumpResult<()>
    where
        T: StreamAccessor + ?Sized,
    {
        let address = match group {
            PumpGroup::Single(pump) => Address::Pump(session.pump_address(pump)?),
            PumpGroup::Dual(..) => Address::Broadcast,
        };
        let commands = set.commands_for(address)?;
        let total = commands.len();
        for (sent, command) in commands.iter().enumerate() {
            self.check_cancelled()?;
            self.transition(SequenceState::Configuring {
                address,
                set: set.name().to_string(),
                remaining: total - sent,
            });
            self.exchanges += 1;
            session.execute(command).await?.into_result()?;
        }
        Ok(())
    }

    async fn pause(&self) -> PumpResult<()> {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(PumpError::Cancelled),
                _ = tokio::time::sleep(self.settings.poll_interval) => Ok(()),
            },
            None => {
                tokio::time::sleep(self.settings.poll_interval).await;
                Ok(())
            }
        }
    }

    fn check_cancelled(&self) -> PumpResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(PumpError::Cancelled),
            _ => Ok(()),
        }
    }

    fn transition(&mut self, next: SequenceState) {
        if self.state != next {
            log::debug!("Sequencer {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::SessionSettings;
    use ne500_core::CommandErrorKind;
    use ne500_transport::mock::ScriptedTransport;

    fn training() -> CommandSet {
        CommandSet::from_pairs("training", [("DIR", "INF"), ("VOL", "0.02"), ("RAT", "100.0")]).unwrap()
    }

    fn settings() -> SequencerSettings {
        SequencerSettings {
            max_status_polls: 3,
            poll_interval: Duration::from_millis(1),
            ..SequencerSettings::default()
        }
    }

    fn session(transport: &mut ScriptedTransport, npumps: u8) -> PumpSession<'_, ScriptedTransport> {
        let mut settings = SessionSettings::with_pumps(npumps);
        settings.frame.max_attempts = 2;
        PumpSession::new(transport, settings)
    }

    #[tokio::test]
    async fn test_single_pump_single_cycle() {
        let mut transport = ScriptedTransport::new();
        transport
            .reply(b"\x0201II0.010W0.000ML\x03")
            .reply(b"\x0201SI0.020W0.000ML\x03")
            .reply(b"\x0201S\x03")
            .reply(b"\x0201S\x03")
            .reply(b"\x0201S\x03")
            .reply(b"\x0201I\x03");

        let mut sequencer = Sequencer::new(settings());
        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 1);
        let report = sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap();

        assert_eq!(report.final_ack.body(), b"01I");
        assert_eq!(report.exchanges, 6);
        assert!(sequencer.state().is_idle());
        assert_eq!(
            transport.written(),
            vec!["01 DIS\r", "01 DIS\r", "01 DIR INF\r", "01 VOL 0.02\r", "01 RAT 100.0\r", "01 RUN\r"]
        );
    }

    #[tokio::test]
    async fn test_later_cycles_rerun_without_polling() {
        let mut transport = ScriptedTransport::new();
        transport.reply(b"\x0201S\x03");
        for _ in 0..3 {
            transport.reply(b"\x0201S\x03");
        }
        for _ in 0..3 {
            transport.reply(b"\x0201I\x03");
        }

        let mut sequencer = Sequencer::new(settings());
        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 3);
        let report = sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap();

        assert_eq!(report.cycles, 3);
        let written = transport.written();
        assert_eq!(written.iter().filter(|w| *w == "01 DIS\r").count(), 1);
        assert_eq!(&written[4..], &["01 RUN\r", "01 RUN\r", "01 RUN\r"]);
    }

    #[tokio::test]
    async fn test_repoll_between_cycles() {
        let mut transport = ScriptedTransport::new();
        transport.reply(b"\x0201S\x03");
        for _ in 0..3 {
            transport.reply(b"\x0201S\x03");
        }
        transport.reply(b"\x0201I\x03").reply(b"\x0201S\x03").reply(b"\x0201I\x03");

        let mut sequencer = Sequencer::new(SequencerSettings {
            repoll_between_cycles: true,
            ..settings()
        });
        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 2);
        sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap();

        let written = transport.written();
        assert_eq!(&written[4..], &["01 RUN\r", "01 DIS\r", "01 RUN\r"]);
    }

    #[tokio::test]
    async fn test_dual_group_broadcasts_once() {
        let mut transport = ScriptedTransport::new();
        transport.reply(b"\x0201S\x03").reply(b"\x0202S\x03");
        for _ in 0..4 {
            transport.reply(b"\x0200S\x03");
        }

        let mut sequencer = Sequencer::new(settings());
        let plan = SequencePlan::new(PumpGroup::Dual(1, 2), training(), 1);
        sequencer.run(&mut session(&mut transport, 2), &plan).await.unwrap();

        assert_eq!(
            transport.written(),
            vec!["01 DIS\r", "02 DIS\r", "* DIR INF\r", "* VOL 0.02\r", "* RAT 100.0\r", "* RUN\r"]
        );
    }

    #[tokio::test]
    async fn test_dual_mode_setup_wraps_run() {
        let mut transport = ScriptedTransport::new();
        for _ in 0..8 {
            transport.reply(b"\x0200S\x03");
        }

        let mut sequencer = Sequencer::new(SequencerSettings {
            dual_mode_setup: true,
            ..settings()
        });
        let plan = SequencePlan::new(PumpGroup::Dual(1, 2), training(), 1);
        sequencer.run(&mut session(&mut transport, 2), &plan).await.unwrap();

        let written = transport.written();
        assert_eq!(written.first().map(String::as_str), Some("* ADR DUAL\r"));
        assert_eq!(written.last().map(String::as_str), Some("* ADR 01\r"));
    }

    #[tokio::test]
    async fn test_dual_mode_is_left_after_rejection() {
        let mut transport = ScriptedTransport::new();
        transport
            .reply(b"\x0200S\x03")
            .reply(b"\x0201S\x03")
            .reply(b"\x0202S\x03")
            .reply(b"\x0200S?OOR\x03")
            .reply(b"\x0200S\x03");

        let mut sequencer = Sequencer::new(SequencerSettings {
            dual_mode_setup: true,
            ..settings()
        });
        let plan = SequencePlan::new(PumpGroup::Dual(1, 2), training(), 1);
        let err = sequencer.run(&mut session(&mut transport, 2), &plan).await.unwrap_err();

        assert!(matches!(err, PumpError::CommandRejected { kind: CommandErrorKind::OutOfRange, .. }));
        assert!(sequencer.state().is_failed());
        assert_eq!(
            transport.written(),
            vec!["* ADR DUAL\r", "01 DIS\r", "02 DIS\r", "* DIR INF\r", "* ADR 01\r"]
        );
    }

    #[tokio::test]
    async fn test_failed_dual_mode_exit_keeps_first_error() {
        let mut transport = ScriptedTransport::new();
        transport
            .reply(b"\x0200S\x03")
            .reply(b"\x0201S\x03")
            .reply(b"\x0202S\x03")
            .reply(b"\x0200S?OOR\x03")
            .reply(b"\x0200S?NA\x03");

        let mut sequencer = Sequencer::new(SequencerSettings {
            dual_mode_setup: true,
            ..settings()
        });
        let plan = SequencePlan::new(PumpGroup::Dual(1, 2), training(), 1);
        let err = sequencer.run(&mut session(&mut transport, 2), &plan).await.unwrap_err();

        match err {
            PumpError::CommandRejected { command, kind } => {
                assert_eq!(command, "* DIR INF");
                assert_eq!(kind, CommandErrorKind::OutOfRange);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(transport.written().last().map(String::as_str), Some("* ADR 01\r"));
    }

    #[test]
    fn test_configuring_state_names_address() {
        let state = SequenceState::Configuring {
            address: Address::Broadcast,
            set: "training".to_string(),
            remaining: 3,
        };
        assert_eq!(state.to_string(), "Configuring(*, training, 3)");

        let state = SequenceState::Configuring {
            address: Address::Pump(PumpAddress::new(2).unwrap()),
            set: "training".to_string(),
            remaining: 1,
        };
        assert_eq!(state.to_string(), "Configuring(02, training, 1)");
    }

    #[tokio::test]
    async fn test_rejection_fails_sequence() {
        let mut transport = ScriptedTransport::new();
        transport.reply(b"\x0201S\x03").reply(b"\x0201S\x03").reply(b"\x0201S?OOR\x03");

        let mut sequencer = Sequencer::new(settings());
        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 1);
        let err = sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap_err();

        match err {
            PumpError::CommandRejected { command, kind } => {
                assert_eq!(command, "01 VOL 0.02");
                assert_eq!(kind, CommandErrorKind::OutOfRange);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(sequencer.state().is_failed());
        // nothing is sent after the rejected command
        assert_eq!(transport.written().len(), 3);
    }

    #[tokio::test]
    async fn test_busy_pump_times_out() {
        let mut transport = ScriptedTransport::new();
        for _ in 0..3 {
            transport.reply(b"\x0201I\x03");
        }

        let mut sequencer = Sequencer::new(settings());
        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 1);
        let err = sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap_err();

        assert!(matches!(err, PumpError::SequenceTimeout { address: 1, polls: 3 }));
        assert!(sequencer.state().is_failed());
    }

    #[tokio::test]
    async fn test_alarm_while_polling() {
        let mut transport = ScriptedTransport::new();
        transport.reply(b"\x0201A?S\x03");

        let mut sequencer = Sequencer::new(settings());
        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 1);
        let err = sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap_err();
        assert!(matches!(err, PumpError::Alarm { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut transport = ScriptedTransport::new();
        let token = CancellationToken::new();
        token.cancel();

        let mut sequencer = Sequencer::new(settings()).with_cancellation(token);
        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 1);
        let err = sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap_err();

        assert!(matches!(err, PumpError::Cancelled));
        assert!(transport.written().is_empty());
    }

    #[tokio::test]
    async fn test_alternating_command_sets_reconfigure() {
        let forward = CommandSet::from_pairs("cleaning", [("VOL", "0.5"), ("DIR", "INF")]).unwrap();
        let reverse = CommandSet::from_pairs("cleaning_rev", [("VOL", "0.2"), ("DIR", "WDR")]).unwrap();

        let mut transport = ScriptedTransport::new();
        for _ in 0..8 {
            transport.reply(b"\x0201S\x03");
        }

        let mut sequencer = Sequencer::new(settings());
        let plan = SequencePlan::alternating(PumpGroup::Single(1), vec![forward, reverse], 2);
        sequencer.run(&mut session(&mut transport, 1), &plan).await.unwrap();

        assert_eq!(
            transport.written(),
            vec![
                "01 DIS\r", "01 VOL 0.5\r", "01 DIR INF\r", "01 RUN\r",
                "01 DIS\r", "01 VOL 0.2\r", "01 DIR WDR\r", "01 RUN\r",
            ]
        );
    }

    #[tokio::test]
    async fn test_plan_validation() {
        let mut transport = ScriptedTransport::new();
        let mut sequencer = Sequencer::new(settings());

        let plan = SequencePlan::new(PumpGroup::Single(3), training(), 1);
        assert!(sequencer.run(&mut session(&mut transport, 2), &plan).await.is_err());

        let plan = SequencePlan::new(PumpGroup::Dual(1, 1), training(), 1);
        assert!(sequencer.run(&mut session(&mut transport, 2), &plan).await.is_err());

        let plan = SequencePlan::new(PumpGroup::Single(1), training(), 0);
        assert!(sequencer.run(&mut session(&mut transport, 2), &plan).await.is_err());
        assert!(transport.written().is_empty());
    }
}
