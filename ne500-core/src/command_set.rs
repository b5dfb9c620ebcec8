//! Named command sets (pump operating recipes)

use crate::address::Address;
use crate::command::{Command, Verb};
use crate::error::{PumpError, PumpResult};
use serde::{Deserialize, Serialize};

/// One verb/parameter pair of a command set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStep {
    pub verb: Verb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl CommandStep {
    pub fn new(verb: Verb, param: Option<&str>) -> Self {
        Self {
            verb,
            param: param.map(str::to_string),
        }
    }

    /// Build the command for the given destination
    pub fn command(&self, address: impl Into<Address>) -> PumpResult<Command> {
        Command::new(address, self.verb, self.param.as_deref())
    }
}

/// Ordered verb/parameter steps representing one operating mode
///
/// Steps are sent in the order given. The same verb may appear more than once
/// (clearing both dispensed counters takes `CLD INF` followed by `CLD WDR`).
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSet {
    name: String,
    steps: Vec<CommandStep>,
}

impl CommandSet {
    /// Create a command set, validating every step
    pub fn new(name: impl Into<String>, steps: Vec<CommandStep>) -> PumpResult<Self> {
        let set = Self {
            name: name.into(),
            steps,
        };
        set.validate()?;
        Ok(set)
    }

    /// Create a command set from `(verb, parameter)` text pairs
    pub fn from_pairs<'a, I>(name: impl Into<String>, pairs: I) -> PumpResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let steps = pairs
            .into_iter()
            .map(|(verb, param)| -> PumpResult<CommandStep> {
                let param = if param.trim().is_empty() { None } else { Some(param) };
                Ok(CommandStep::new(verb.parse()?, param))
            })
            .collect::<PumpResult<Vec<_>>>()?;
        Self::new(name, steps)
    }

    /// Check every step; run/stop/reset are sequencer duties and not allowed here
    pub fn validate(&self) -> PumpResult<()> {
        if self.steps.is_empty() {
            return Err(PumpError::InvalidParameter(format!(
                "command set {:?} has no steps",
                self.name
            )));
        }
        for step in &self.steps {
            if matches!(step.verb, Verb::Run | Verb::Stp | Verb::Reset) {
                return Err(PumpError::InvalidParameter(format!(
                    "command set {:?} may not contain {}",
                    self.name, step.verb
                )));
            }
            step.verb.validate_param(step.param.as_deref()).map_err(|e| {
                PumpError::InvalidParameter(format!("command set {:?}: {}", self.name, e))
            })?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[CommandStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Commands for one destination, in send order
    pub fn commands_for(&self, address: impl Into<Address>) -> PumpResult<Vec<Command>> {
        let address = address.into();
        self.steps.iter().map(|step| step.command(address)).collect()
    }
}
