//! Session layer module for NE-500 pump networks
//!
//! This crate turns raw gateway bytes into reply frames and translates between
//! commands and the pump's line protocol.
//!
//! - [`FrameReader`] assembles one frame per call, resynchronising on garbled
//!   input within a bounded number of read attempts.
//! - [`codec`] formats outbound commands and classifies inbound frames.

pub mod codec;
pub mod frame;
pub mod reader;
pub mod reply;
pub mod statistics;

pub use codec::{classify, format, format_burst, format_raw, parse_burst, parse_command};
pub use frame::{Frame, FramingMode, CR, ETX, LF, STX};
pub use ne500_core::{PumpError, PumpResult};
pub use reader::{FrameReader, FrameSettings};
pub use reply::Reply;
pub use statistics::FrameStatistics;
