//! Classified pump replies

use ne500_core::{AlarmCode, CommandErrorKind, PumpStatus};
use std::fmt;

/// A reply frame sorted into one of the four protocol categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Bare prompt, the pump accepted the command
    Status(PumpStatus),
    /// Prompt followed by query data (e.g. the `DIS` volumes)
    Data {
        status: Option<PumpStatus>,
        payload: String,
    },
    /// The pump refused the command
    CommandError {
        status: Option<PumpStatus>,
        kind: CommandErrorKind,
    },
    /// Safety condition; never to be retried silently
    Alarm(AlarmCode),
}

impl Reply {
    /// Prompt status carried by the reply, if any
    pub fn status(&self) -> Option<PumpStatus> {
        match self {
            Reply::Status(status) => Some(*status),
            Reply::Data { status, .. } | Reply::CommandError { status, .. } => *status,
            Reply::Alarm(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::CommandError { .. })
    }

    pub fn is_alarm(&self) -> bool {
        matches!(self, Reply::Alarm(_))
    }

    /// Neither a command error nor an alarm
    pub fn is_ok(&self) -> bool {
        !self.is_error() && !self.is_alarm()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(status) => write!(f, "status {}", status),
            Reply::Data { payload, .. } => write!(f, "data {:?}", payload),
            Reply::CommandError { kind, .. } => write!(f, "error {}", kind),
            Reply::Alarm(code) => write!(f, "alarm {}", code),
        }
    }
}
