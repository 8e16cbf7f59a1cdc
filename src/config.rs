//! Configuration System using Figment
//!
//! Configuration is layered, later sources winning:
//! 1. Built-in defaults
//! 2. A TOML file (`config/serial_scope.toml` unless another path is given)
//! 3. Environment variables prefixed with `SERIAL_SCOPE_`, nested keys split
//!    on `__` (e.g. `SERIAL_SCOPE_SERIAL__BAUD_RATE=9600`)
//!
//! # Example
//! ```no_run
//! use serial_scope::config::ScopeConfig;
//!
//! let config = ScopeConfig::load()?;
//! println!("Baud rate: {}", config.serial.baud_rate);
//! # Ok::<(), serial_scope::error::ScopeError>(())
//! ```

use crate::acquisition::AcquisitionConfig;
use crate::alc::ProtocolTimeouts;
use crate::error::{AppResult, ScopeError};
use crate::serial::SimulatorConfig;
use crate::tracing_setup::OutputFormat;
use crate::validation::{is_in_range, is_positive_finite, is_valid_log_level};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/serial_scope.toml";
/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SERIAL_SCOPE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial connection settings
    pub serial: SerialConfig,
    /// Sample rate, timebase and scaling
    pub acquisition: AcquisitionConfig,
    /// ALC command deadlines
    pub protocol: ProtocolTimeouts,
    /// Refresh cadence
    pub display: DisplayConfig,
    /// Simulated instrument
    pub simulator: SimulatorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: OutputFormat::default(),
        }
    }
}

/// Serial connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port path; may be left empty and given on the command line
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Longest single read the reader task makes while holding the port
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long a disconnect waits for the reader task before aborting it
    #[serde(with = "humantime_serde")]
    pub stop_grace: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            poll_interval: Duration::from_millis(10),
            stop_grace: Duration::from_millis(500),
        }
    }
}

/// Display refresh configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Interval between scope ticks
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(30),
        }
    }
}

impl ScopeConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack used by [`load_from`](Self::load_from).
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        is_valid_log_level(&self.application.log_level).map_err(|msg| {
            ScopeError::Configuration(format!(
                "application.log_level '{}': {msg}",
                self.application.log_level
            ))
        })?;

        is_in_range(self.serial.baud_rate, 300..=4_000_000).map_err(|msg| {
            ScopeError::Configuration(format!("serial.baud_rate {}: {msg}", self.serial.baud_rate))
        })?;

        let durations = [
            ("serial.poll_interval", self.serial.poll_interval),
            ("serial.stop_grace", self.serial.stop_grace),
            ("protocol.get_timeout", self.protocol.get_timeout),
            ("protocol.set_timeout", self.protocol.set_timeout),
            ("protocol.poll_interval", self.protocol.poll_interval),
            ("display.tick_interval", self.display.tick_interval),
            ("simulator.batch_interval", self.simulator.batch_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ScopeError::Configuration(format!("{name} must be greater than zero")));
            }
        }

        self.acquisition
            .validate()
            .map_err(|e| ScopeError::Configuration(format!("acquisition: {e}")))?;

        for (name, value) in [
            ("simulator.sample_rate_hz", self.simulator.sample_rate_hz),
            ("simulator.frequency_hz", self.simulator.frequency_hz),
        ] {
            is_positive_finite(value)
                .map_err(|msg| ScopeError::Configuration(format!("{name} = {value}: {msg}")))?;
        }
        if self.simulator.noise_counts < 0 {
            return Err(ScopeError::Configuration(format!(
                "simulator.noise_counts {} must not be negative",
                self.simulator.noise_counts
            )));
        }

        Ok(())
    }
}
