//! Pump network addresses

use crate::error::{PumpError, PumpResult};
use std::fmt;

/// Highest address the NE-500 network protocol can express (two digits)
pub const MAX_PUMP_ADDRESS: u8 = 99;

/// Address of a single pump on the shared serial bus
///
/// Rendered right-justified and zero-padded to two digits (`01`, `12`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PumpAddress(u8);

impl PumpAddress {
    /// Create a pump address, rejecting values that do not fit in two digits
    pub fn new(address: u8) -> PumpResult<Self> {
        if address > MAX_PUMP_ADDRESS {
            return Err(PumpError::InvalidAddress(format!(
                "address {} exceeds upper bound of {}",
                address, MAX_PUMP_ADDRESS
            )));
        }
        Ok(Self(address))
    }

    /// Create a pump address that must satisfy `1 <= address <= npumps`
    pub fn in_network(address: u8, npumps: u8) -> PumpResult<Self> {
        if address == 0 || address > npumps {
            return Err(PumpError::InvalidAddress(format!(
                "pump {} is outside the network range 1..={}",
                address, npumps
            )));
        }
        Self::new(address)
    }

    /// Numeric value of the address
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for PumpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl TryFrom<u8> for PumpAddress {
    type Error = PumpError;

    fn try_from(value: u8) -> PumpResult<Self> {
        Self::new(value)
    }
}

/// Destination of an outbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// One addressed pump
    Pump(PumpAddress),
    /// Wildcard `*`: every pump on the network receives the command
    Broadcast,
}

impl Address {
    /// The single pump addressed, if any
    pub fn pump(&self) -> Option<PumpAddress> {
        match self {
            Address::Pump(pump) => Some(*pump),
            Address::Broadcast => None,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Address::Broadcast)
    }
}

impl From<PumpAddress> for Address {
    fn from(pump: PumpAddress) -> Self {
        Address::Pump(pump)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Pump(pump) => write!(f, "{}", pump),
            Address::Broadcast => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_padding() {
        assert_eq!(PumpAddress::new(1).unwrap().to_string(), "01");
        assert_eq!(PumpAddress::new(42).unwrap().to_string(), "42");
        assert_eq!(Address::Broadcast.to_string(), "*");
    }

    #[test]
    fn test_address_bounds() {
        assert!(PumpAddress::new(100).is_err());
        assert!(PumpAddress::in_network(0, 2).is_err());
        assert!(PumpAddress::in_network(3, 2).is_err());
        assert_eq!(PumpAddress::in_network(2, 2).unwrap().value(), 2);
    }
}
