//! Pump network configuration
//!
//! Loaded from a TOML file with `NE500_`-prefixed environment variables on
//! top, e.g. `NE500_HOST=192.168.0.4 NE500_NPUMPS=2`:
//!
//! ```toml
//! host = "192.168.0.2"
//! port = 100
//! npumps = 2
//! io_timeout = 0.01
//!
//! [[command_sets.training]]
//! verb = "DIA"
//! param = "15.0"
//! ```

use crate::pump::SessionSettings;
use crate::sequencer::SequencerSettings;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use ne500_core::{CommandSet, CommandStep, PumpError, PumpResult, MAX_PUMP_ADDRESS};
use ne500_session::{FrameSettings, FramingMode};
use ne500_transport::{IoSettings, TcpSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "NE500_";

/// Everything needed to drive one pump network gateway
///
/// Durations are given in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: f64,
    /// Read/write readiness poll timeout
    pub io_timeout: f64,
    pub sleep_on_timeout: f64,
    pub max_timeout_retries: u32,
    pub npumps: u8,
    pub ncycles: u32,
    pub verbose: bool,
    pub framing: FramingMode,
    pub min_frame_len: usize,
    pub max_frame_attempts: u32,
    pub max_frame_len: usize,
    pub max_status_polls: u32,
    pub status_poll_interval: f64,
    pub repoll_between_cycles: bool,
    pub dual_mode_setup: bool,
    /// Named recipes, each an ordered list of verb/parameter steps
    pub command_sets: BTreeMap<String, Vec<CommandStep>>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 100,
            connect_timeout: 1.0,
            io_timeout: 0.01,
            sleep_on_timeout: 0.01,
            max_timeout_retries: 1,
            npumps: 1,
            ncycles: 1,
            verbose: false,
            framing: FramingMode::StxEtx,
            min_frame_len: 5,
            max_frame_attempts: 10,
            max_frame_len: 256,
            max_status_polls: 300,
            status_poll_interval: 0.2,
            repoll_between_cycles: false,
            dual_mode_setup: false,
            command_sets: BTreeMap::new(),
        }
    }
}

impl NetworkConfig {
    /// Load from `path`, then apply environment overrides, then validate
    pub fn load(path: impl AsRef<Path>) -> PumpResult<Self> {
        Self::extract(Self::figment().merge(Toml::file(path.as_ref())).merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Parse TOML text, without environment overrides
    pub fn from_toml_str(text: &str) -> PumpResult<Self> {
        Self::extract(Self::figment().merge(Toml::string(text)))
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(NetworkConfig::default()))
    }

    fn extract(figment: Figment) -> PumpResult<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| PumpError::Config(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and every command set
    pub fn validate(&self) -> PumpResult<()> {
        if self.host.trim().is_empty() {
            return Err(PumpError::Config("host must not be empty".to_string()));
        }
        if self.npumps == 0 || self.npumps > MAX_PUMP_ADDRESS {
            return Err(PumpError::Config(format!(
                "npumps must be between 1 and {}, got {}",
                MAX_PUMP_ADDRESS, self.npumps
            )));
        }
        if self.ncycles == 0 {
            return Err(PumpError::Config("ncycles must be at least 1".to_string()));
        }
        if self.max_frame_attempts == 0 || self.max_status_polls == 0 {
            return Err(PumpError::Config(
                "max_frame_attempts and max_status_polls must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("io_timeout", self.io_timeout),
            ("sleep_on_timeout", self.sleep_on_timeout),
            ("status_poll_interval", self.status_poll_interval),
        ] {
            seconds(name, value)?;
        }
        for name in self.command_sets.keys() {
            self.command_set(name)?;
        }
        Ok(())
    }

    /// Named command set, validated
    pub fn command_set(&self, name: &str) -> PumpResult<CommandSet> {
        let steps = self
            .command_sets
            .get(name)
            .ok_or_else(|| PumpError::Config(format!("no command set named {:?}", name)))?;
        CommandSet::new(name, steps.clone()).map_err(|e| PumpError::Config(format!("command set {:?}: {}", name, e)))
    }

    pub fn tcp_settings(&self) -> PumpResult<TcpSettings> {
        Ok(TcpSettings {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: seconds("connect_timeout", self.connect_timeout)?,
            io: IoSettings {
                timeout: seconds("io_timeout", self.io_timeout)?,
                sleep_on_timeout: seconds("sleep_on_timeout", self.sleep_on_timeout)?,
                max_timeout_retries: self.max_timeout_retries,
                verbose: self.verbose,
            },
        })
    }

    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            mode: self.framing,
            min_frame_len: self.min_frame_len,
            max_attempts: self.max_frame_attempts,
            max_frame_len: self.max_frame_len,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            npumps: self.npumps,
            frame: self.frame_settings(),
        }
    }

    pub fn sequencer_settings(&self) -> PumpResult<SequencerSettings> {
        Ok(SequencerSettings {
            max_status_polls: self.max_status_polls,
            poll_interval: seconds("status_poll_interval", self.status_poll_interval)?,
            repoll_between_cycles: self.repoll_between_cycles,
            dual_mode_setup: self.dual_mode_setup,
        })
    }
}

fn seconds(name: &str, value: f64) -> PumpResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| PumpError::Config(format!("{} must be a non-negative number of seconds, got {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use ne500_core::Verb;

    const EXAMPLE: &str = include_str!("../../config/ne500.example.toml");

    #[test]
    fn test_defaults_match_gateway_driver() {
        let config = NetworkConfig::default();
        config.validate().unwrap();

        let tcp = config.tcp_settings().unwrap();
        assert_eq!(tcp.connect_timeout, Duration::from_secs(1));
        assert_eq!(tcp.io.timeout, Duration::from_millis(10));
        assert_eq!(tcp.io.sleep_on_timeout, Duration::from_millis(10));
        assert_eq!(tcp.io.max_timeout_retries, 1);
        assert_eq!(config.session_settings().npumps, 1);
    }

    #[test]
    fn test_example_recipes() {
        let config = NetworkConfig::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(config.npumps, 2);

        let training = config.command_set("training").unwrap();
        let verbs: Vec<Verb> = training.steps().iter().map(|s| s.verb).collect();
        assert_eq!(verbs, vec![Verb::Dia, Verb::Rat, Verb::Vol, Verb::Dir, Verb::Cld, Verb::Cld]);
        assert_eq!(training.steps()[2].param.as_deref(), Some("0.02"));

        let rev = config.command_set("cleaning_rev").unwrap();
        assert_eq!(rev.steps()[3].param.as_deref(), Some("WDR"));
        assert!(config.command_set("priming").is_err());
    }

    #[test]
    fn test_validation_errors() {
        assert!(NetworkConfig::from_toml_str("npumps = 0").is_err());
        assert!(NetworkConfig::from_toml_str("npumps = 100").is_err());
        assert!(NetworkConfig::from_toml_str("host = \"\"").is_err());
        assert!(NetworkConfig::from_toml_str("io_timeout = -1.0").is_err());
        assert!(NetworkConfig::from_toml_str("framing = \"xmodem\"").is_err());

        let bad_recipe = r#"
            [[command_sets.broken]]
            verb = "VOL"
            param = "lots"
        "#;
        assert!(matches!(NetworkConfig::from_toml_str(bad_recipe), Err(PumpError::Config(_))));

        let run_in_recipe = r#"
            [[command_sets.broken]]
            verb = "RUN"
        "#;
        assert!(NetworkConfig::from_toml_str(run_in_recipe).is_err());
    }

    #[test]
    fn test_file_with_env_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ne500.toml",
                r#"
                    host = "192.168.0.2"
                    npumps = 2
                    framing = "newline"
                "#,
            )?;
            jail.set_env("NE500_HOST", "192.168.0.4");
            jail.set_env("NE500_NCYCLES", "5");

            let config = NetworkConfig::load("ne500.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.host, "192.168.0.4");
            assert_eq!(config.npumps, 2);
            assert_eq!(config.ncycles, 5);
            assert_eq!(config.framing, FramingMode::Newline);
            assert_eq!(config.frame_settings().mode, FramingMode::Newline);
            Ok(())
        });
    }
}
