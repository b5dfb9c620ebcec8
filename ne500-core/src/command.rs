//! Commands sent to the pump network

use crate::address::{Address, PumpAddress};
use crate::error::{PumpError, PumpResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Command verbs understood by NE-500 pumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// `DIA`: inside diameter of the syringe in mm, also selects volume units
    Dia,
    /// `RAT`: pumping rate
    Rat,
    /// `VOL`: volume to be pumped, `0` for continuous pumping
    Vol,
    /// `DIR`: pumping direction (`INF`, `WDR`, `REV`)
    Dir,
    /// `RUN`: start the pumping program
    Run,
    /// `STP`: stop the pumping program
    Stp,
    /// `RESET`: reset the pump network to factory defaults
    Reset,
    /// `DIS`: query volume dispensed
    Dis,
    /// `CLD`: clear volume dispensed in one direction
    Cld,
    /// `ADR`: network address and dual/reciprocating mode
    Adr,
    /// `FUN`: pumping program phase function
    Fun,
}

impl Verb {
    /// Wire token of the verb
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Dia => "DIA",
            Verb::Rat => "RAT",
            Verb::Vol => "VOL",
            Verb::Dir => "DIR",
            Verb::Run => "RUN",
            Verb::Stp => "STP",
            Verb::Reset => "RESET",
            Verb::Dis => "DIS",
            Verb::Cld => "CLD",
            Verb::Adr => "ADR",
            Verb::Fun => "FUN",
        }
    }

    /// Validate a parameter for this verb
    ///
    /// Quantities must be finite non-negative numbers; direction-like verbs
    /// accept only the tokens the pump documents. Device ranges are left to
    /// the pump, which answers `?OOR` when a value is out of range.
    pub fn validate_param(&self, param: Option<&str>) -> PumpResult<()> {
        match (self, param) {
            (Verb::Dia | Verb::Rat | Verb::Vol, Some(value)) => parse_quantity(*self, value).map(|_| ()),
            (Verb::Dir, Some(value)) => value.parse::<Direction>().map(|_| ()),
            (Verb::Cld, Some(value)) => match value.parse::<Direction>()? {
                Direction::Reverse => Err(PumpError::InvalidParameter(
                    "CLD accepts INF or WDR only".to_string(),
                )),
                _ => Ok(()),
            },
            (Verb::Cld, None) => Err(PumpError::InvalidParameter(
                "CLD requires a direction (INF or WDR)".to_string(),
            )),
            (Verb::Adr, Some(value)) => validate_adr(value),
            (Verb::Run, Some(value)) => value.parse::<u8>().map(|_| ()).map_err(|_| {
                PumpError::InvalidParameter(format!("RUN phase must be a number, got {:?}", value))
            }),
            (Verb::Fun, Some(value)) => {
                if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) {
                    Ok(())
                } else {
                    Err(PumpError::InvalidParameter(format!(
                        "FUN takes a single function token, got {:?}",
                        value
                    )))
                }
            }
            (Verb::Stp | Verb::Reset | Verb::Dis, Some(value)) => Err(PumpError::InvalidParameter(
                format!("{} takes no parameter, got {:?}", self.as_str(), value),
            )),
            (_, None) => Ok(()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = PumpError;

    fn from_str(s: &str) -> PumpResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DIA" => Ok(Verb::Dia),
            "RAT" => Ok(Verb::Rat),
            "VOL" => Ok(Verb::Vol),
            "DIR" => Ok(Verb::Dir),
            "RUN" => Ok(Verb::Run),
            "STP" => Ok(Verb::Stp),
            "RESET" => Ok(Verb::Reset),
            "DIS" => Ok(Verb::Dis),
            "CLD" => Ok(Verb::Cld),
            "ADR" => Ok(Verb::Adr),
            "FUN" => Ok(Verb::Fun),
            other => Err(PumpError::InvalidParameter(format!("unknown verb {:?}", other))),
        }
    }
}

/// Pumping direction parameter of `DIR` and `CLD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Infuse,
    Withdraw,
    /// Reverse the current direction (`DIR` only)
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Infuse => "INF",
            Direction::Withdraw => "WDR",
            Direction::Reverse => "REV",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = PumpError;

    fn from_str(s: &str) -> PumpResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INF" => Ok(Direction::Infuse),
            "WDR" => Ok(Direction::Withdraw),
            "REV" => Ok(Direction::Reverse),
            other => Err(PumpError::InvalidParameter(format!(
                "unknown direction {:?}, expected INF, WDR or REV",
                other
            ))),
        }
    }
}

fn parse_quantity(verb: Verb, value: &str) -> PumpResult<f64> {
    let parsed: f64 = value.trim().parse().map_err(|_| {
        PumpError::InvalidParameter(format!("{} expects a number, got {:?}", verb, value))
    })?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(PumpError::InvalidParameter(format!(
            "{} must be a finite non-negative number, got {}",
            verb, value
        )));
    }
    Ok(parsed)
}

fn validate_adr(value: &str) -> PumpResult<()> {
    for part in value.split(',') {
        let part = part.trim();
        let ok = part.eq_ignore_ascii_case("DUAL")
            || part.eq_ignore_ascii_case("RECP")
            || part.parse::<u8>().map(|n| n <= crate::MAX_PUMP_ADDRESS).unwrap_or(false);
        if !ok {
            return Err(PumpError::InvalidParameter(format!(
                "ADR expects an address 0-99, DUAL or RECP, got {:?}",
                value
            )));
        }
    }
    Ok(())
}

/// Render a quantity the way the pump expects it
///
/// At most four decimals, trailing zeros trimmed but one decimal kept
/// (`0.02`, `100.0`). Positive values below `0.00005` round to `0.0`;
/// [`Command::quantity`] refuses those since `VOL 0` means pump forever.
pub fn format_quantity(value: f64) -> String {
    let mut text = format!("{:.4}", value);
    while text.ends_with('0') && !text.ends_with(".0") {
        text.pop();
    }
    text
}

/// One outbound command: address, verb and optional parameter
///
/// Immutable once built. `Display` renders the wire text without the
/// carriage-return terminator, which the codec appends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    address: Address,
    verb: Verb,
    param: Option<String>,
}

impl Command {
    /// Create a command, validating the parameter for the verb
    pub fn new(address: impl Into<Address>, verb: Verb, param: Option<&str>) -> PumpResult<Self> {
        let param = param.map(str::trim).filter(|p| !p.is_empty());
        verb.validate_param(param)?;
        Ok(Self {
            address: address.into(),
            verb,
            param: param.map(|p| p.to_ascii_uppercase()),
        })
    }

    /// Command without a parameter
    pub fn bare(address: impl Into<Address>, verb: Verb) -> Self {
        Self {
            address: address.into(),
            verb,
            param: None,
        }
    }

    /// `DIR` command
    pub fn direction(address: impl Into<Address>, direction: Direction) -> Self {
        Self {
            address: address.into(),
            verb: Verb::Dir,
            param: Some(direction.as_str().to_string()),
        }
    }

    /// Quantity command (`VOL`, `RAT`, `DIA`)
    pub fn quantity(address: impl Into<Address>, verb: Verb, value: f64) -> PumpResult<Self> {
        let text = format_quantity(value);
        if value > 0.0 && text.parse::<f64>().map_or(false, |rounded| rounded == 0.0) {
            return Err(PumpError::InvalidParameter(format!(
                "{} {} rounds to zero at four decimals",
                verb, value
            )));
        }
        Self::new(address, verb, Some(&text))
    }

    /// Same verb and parameter sent to another address
    pub fn readdressed(&self, address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            verb: self.verb,
            param: self.param.clone(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The single pump addressed, `None` for broadcast commands
    pub fn pump(&self) -> Option<PumpAddress> {
        self.address.pump()
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // RESET travels as "<addr> * RESET": the pump applies it network-wide.
        if self.verb == Verb::Reset {
            return write!(f, "{} * {}", self.address, self.verb);
        }
        write!(f, "{} {}", self.address, self.verb)?;
        if let Some(param) = &self.param {
            write!(f, " {}", param)?;
        }
        Ok(())
    }
}
