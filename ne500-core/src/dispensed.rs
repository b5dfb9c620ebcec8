//! Volume dispensed, as reported by the `DIS` query

use crate::error::{PumpError, PumpResult};
use std::fmt;

/// Volume units reported by the pump
///
/// The pump picks microlitres for syringes under 14.01 mm inside diameter and
/// millilitres above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeUnits {
    Microlitres,
    Millilitres,
}

impl VolumeUnits {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeUnits::Microlitres => "UL",
            VolumeUnits::Millilitres => "ML",
        }
    }
}

/// Accumulated infused and withdrawn volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispensedVolume {
    pub infused: f64,
    pub withdrawn: f64,
    pub units: VolumeUnits,
}

impl DispensedVolume {
    /// Parse a `DIS` payload such as `I0.020W0.000ML`
    pub fn parse(payload: &str) -> PumpResult<Self> {
        let text = payload.trim().to_ascii_uppercase();
        let invalid = || PumpError::InvalidParameter(format!("unrecognized DIS reply {:?}", payload));

        let rest = text.strip_prefix('I').ok_or_else(invalid)?;
        let w_pos = rest.find('W').ok_or_else(invalid)?;
        let infused: f64 = rest[..w_pos].trim().parse().map_err(|_| invalid())?;

        let rest = &rest[w_pos + 1..];
        let (number, units) = if let Some(number) = rest.strip_suffix("UL") {
            (number, VolumeUnits::Microlitres)
        } else if let Some(number) = rest.strip_suffix("ML") {
            (number, VolumeUnits::Millilitres)
        } else {
            return Err(invalid());
        };
        let withdrawn: f64 = number.trim().parse().map_err(|_| invalid())?;

        Ok(Self {
            infused,
            withdrawn,
            units,
        })
    }
}

impl fmt::Display for DispensedVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "infused {} {}, withdrawn {} {}",
            self.infused,
            self.units.as_str(),
            self.withdrawn,
            self.units.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dispensed() {
        let dis = DispensedVolume::parse("I0.020W0.000ML").unwrap();
        assert_eq!(dis.infused, 0.02);
        assert_eq!(dis.withdrawn, 0.0);
        assert_eq!(dis.units, VolumeUnits::Millilitres);

        let dis = DispensedVolume::parse("I12.5W3.25UL").unwrap();
        assert_eq!(dis.withdrawn, 3.25);
        assert_eq!(dis.units, VolumeUnits::Microlitres);
    }

    #[test]
    fn test_parse_dispensed_rejects_garbage() {
        assert!(DispensedVolume::parse("").is_err());
        assert!(DispensedVolume::parse("I1.0ML").is_err());
        assert!(DispensedVolume::parse("I1.0W2.0GAL").is_err());
    }
}
