//! NE-500 pump network client
//!
//! This crate drives syringe pumps behind a TCP-to-serial gateway:
//!
//! - [`PumpSession`]: per-pump operations (infuse, withdraw, stop, reset,
//!   queries and setters), each a strict write-then-read exchange
//! - [`Sequencer`]: poll-until-idle, configure, run, repeated over N cycles
//!   for one pump or a dual-pump group
//! - [`NetworkConfig`] and [`ConnectionBuilder`]: configuration from file,
//!   environment or code, producing a [`PumpNetwork`]

pub mod builder;
pub mod config;
pub mod network;
pub mod pump;
pub mod sequencer;

pub use builder::ConnectionBuilder;
pub use config::NetworkConfig;
pub use network::PumpNetwork;
pub use pump::{Exchange, Outcome, PumpSession, SessionSettings};
pub use sequencer::{PumpGroup, SequencePlan, SequenceReport, SequenceState, Sequencer, SequencerSettings};
