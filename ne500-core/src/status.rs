//! Prompt, command-error and alarm codes found in pump replies

use std::fmt;

/// Pump prompt carried by every reply
///
/// The NE-500 answers each command with a prompt letter describing its
/// current pumping state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PumpStatus {
    /// `I`: infusing
    Infusing,
    /// `W`: withdrawing
    Withdrawing,
    /// `S`: stopped, the pump is idle and may be reprogrammed
    Stopped,
    /// `P`: pumping program paused
    Paused,
    /// `T`: timed pause phase
    TimedPause,
    /// `U`: waiting for a user start trigger
    UserWait,
    /// `X`: purging
    Purging,
}

impl PumpStatus {
    /// Decode a prompt letter
    pub fn from_prompt(prompt: u8) -> Option<Self> {
        match prompt {
            b'I' => Some(PumpStatus::Infusing),
            b'W' => Some(PumpStatus::Withdrawing),
            b'S' => Some(PumpStatus::Stopped),
            b'P' => Some(PumpStatus::Paused),
            b'T' => Some(PumpStatus::TimedPause),
            b'U' => Some(PumpStatus::UserWait),
            b'X' => Some(PumpStatus::Purging),
            _ => None,
        }
    }

    /// The prompt letter for this status
    pub fn prompt(&self) -> char {
        match self {
            PumpStatus::Infusing => 'I',
            PumpStatus::Withdrawing => 'W',
            PumpStatus::Stopped => 'S',
            PumpStatus::Paused => 'P',
            PumpStatus::TimedPause => 'T',
            PumpStatus::UserWait => 'U',
            PumpStatus::Purging => 'X',
        }
    }

    /// Whether the pump is idle and ready to accept a new program
    pub fn is_idle(&self) -> bool {
        matches!(self, PumpStatus::Stopped)
    }
}

impl fmt::Display for PumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PumpStatus::Infusing => "infusing",
            PumpStatus::Withdrawing => "withdrawing",
            PumpStatus::Stopped => "stopped",
            PumpStatus::Paused => "paused",
            PumpStatus::TimedPause => "timed pause",
            PumpStatus::UserWait => "waiting for user",
            PumpStatus::Purging => "purging",
        };
        write!(f, "{} ({})", name, self.prompt())
    }
}

/// Command error reported by the pump (`?` family)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandErrorKind {
    /// `?`: command not recognized
    Unrecognized,
    /// `?NA`: command not applicable at this time
    NotApplicable,
    /// `?OOR`: command data out of range
    OutOfRange,
    /// `?COM`: invalid communications packet received
    Communication,
    /// `?IGN`: command ignored because a new phase started
    Ignored,
}

impl CommandErrorKind {
    /// Decode the text following a `?` marker
    ///
    /// Anything that is not one of the known suffixes is reported as
    /// [`CommandErrorKind::Unrecognized`], the pump's bare `?` reply.
    pub fn from_suffix(suffix: &str) -> Self {
        if suffix.starts_with("OOR") {
            CommandErrorKind::OutOfRange
        } else if suffix.starts_with("NA") {
            CommandErrorKind::NotApplicable
        } else if suffix.starts_with("COM") {
            CommandErrorKind::Communication
        } else if suffix.starts_with("IGN") {
            CommandErrorKind::Ignored
        } else {
            CommandErrorKind::Unrecognized
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandErrorKind::Unrecognized => "?",
            CommandErrorKind::NotApplicable => "?NA",
            CommandErrorKind::OutOfRange => "?OOR",
            CommandErrorKind::Communication => "?COM",
            CommandErrorKind::Ignored => "?IGN",
        }
    }
}

impl fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CommandErrorKind::Unrecognized => "command not recognized",
            CommandErrorKind::NotApplicable => "command not applicable",
            CommandErrorKind::OutOfRange => "command data out of range",
            CommandErrorKind::Communication => "invalid communications packet",
            CommandErrorKind::Ignored => "command ignored",
        };
        write!(f, "{} ({})", text, self.as_str())
    }
}

/// Alarm raised by the pump (`A` prompt followed by `?<code>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmCode {
    /// `R`: pump was reset (power interrupted)
    Reset,
    /// `S`: pump motor stalled
    Stalled,
    /// `T`: safe mode communications time out
    CommsTimeout,
    /// `E`: pumping program error
    ProgramError,
    /// `O`: pumping program phase out of range
    PhaseOutOfRange,
    /// Sub-code this crate does not know about
    Other(char),
    /// Alarm prompt without a sub-code
    Unspecified,
}

impl AlarmCode {
    /// Decode the sub-code character following `A?`
    pub fn from_code(code: Option<char>) -> Self {
        match code {
            Some('R') => AlarmCode::Reset,
            Some('S') => AlarmCode::Stalled,
            Some('T') => AlarmCode::CommsTimeout,
            Some('E') => AlarmCode::ProgramError,
            Some('O') => AlarmCode::PhaseOutOfRange,
            Some(other) => AlarmCode::Other(other),
            None => AlarmCode::Unspecified,
        }
    }
}

impl fmt::Display for AlarmCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmCode::Reset => write!(f, "pump was reset (A?R)"),
            AlarmCode::Stalled => write!(f, "pump motor stalled (A?S)"),
            AlarmCode::CommsTimeout => write!(f, "communications time out (A?T)"),
            AlarmCode::ProgramError => write!(f, "pumping program error (A?E)"),
            AlarmCode::PhaseOutOfRange => write!(f, "program phase out of range (A?O)"),
            AlarmCode::Other(code) => write!(f, "unknown alarm (A?{})", code),
            AlarmCode::Unspecified => write!(f, "alarm (A)"),
        }
    }
}
