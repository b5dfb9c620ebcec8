//! Core types and utilities for the NE-500 pump network protocol
//!
//! This crate provides the error taxonomy, pump addressing, commands and
//! command sets, and the status/alarm codes carried by pump replies.

pub mod address;
pub mod command;
pub mod command_set;
pub mod dispensed;
pub mod error;
pub mod status;

pub use address::{Address, PumpAddress, MAX_PUMP_ADDRESS};
pub use command::{Command, Direction, Verb};
pub use command_set::{CommandSet, CommandStep};
pub use dispensed::{DispensedVolume, VolumeUnits};
pub use error::{PumpError, PumpResult};
pub use status::{AlarmCode, CommandErrorKind, PumpStatus};
