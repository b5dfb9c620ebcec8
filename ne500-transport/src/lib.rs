//! Transport layer module for NE-500 pump networks
//!
//! This crate provides the byte-stream transport to a TCP-to-serial gateway.
//! All waiting is readiness polling bounded by a timeout and a retry budget,
//! never an unbounded blocking read or write.

pub mod scoped;
pub mod stream;
pub mod tcp;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use ne500_core::{PumpError, PumpResult};
pub use scoped::{run_scoped, with_connection};
pub use stream::{escape_bytes, ReadLength, StreamAccessor, TransportLayer};
pub use tcp::{IoSettings, TcpSettings, TcpTransport};
