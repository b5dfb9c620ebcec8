use crate::status::{AlarmCode, CommandErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Main error type for pump network operations
#[derive(Error, Debug)]
pub enum PumpError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Write timed out too many times [{attempts}]")]
    WriteTimeout { attempts: u32 },

    #[error("Read timed out too many times [{attempts}], {received} byte(s) received")]
    ReadTimeout { attempts: u32, received: usize },

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Command {command:?} rejected by pump: {kind}")]
    CommandRejected {
        command: String,
        kind: CommandErrorKind,
    },

    #[error("Alarm on pump {address:?}: {code}")]
    Alarm {
        address: Option<u8>,
        code: AlarmCode,
    },

    #[error("Pump {address:02} did not become idle after {polls} status polls")]
    SequenceTimeout { address: u8, polls: u32 },

    #[error("Invalid pump address: {0}")]
    InvalidAddress(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl PumpError {
    /// True for the transport-level timeouts (connect, read and write)
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PumpError::ConnectTimeout(_)
                | PumpError::WriteTimeout { .. }
                | PumpError::ReadTimeout { .. }
        )
    }

    /// True when the pump answered but refused the command or raised an alarm
    ///
    /// These are protocol outcomes rather than transport faults, so callers
    /// usually decide between retrying, aborting or alerting an operator.
    pub fn is_device_rejection(&self) -> bool {
        matches!(
            self,
            PumpError::CommandRejected { .. } | PumpError::Alarm { .. }
        )
    }
}

/// Result type alias for pump network operations
pub type PumpResult<T> = Result<T, PumpError>;
