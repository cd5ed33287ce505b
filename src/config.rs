//! Configuration loading using Figment
//!
//! Configuration is assembled from, lowest to highest precedence:
//! 1. Built-in defaults (mirroring the bench the tool was written for)
//! 2. `config/power_cycler.toml` (or the file given with `--config`)
//! 3. Environment variables prefixed with `POWER_CYCLER_`
//! 4. Command-line overrides applied by the binary
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! POWER_CYCLER_APPLICATION__LOG_LEVEL=debug
//! POWER_CYCLER_INSTRUMENT__ENDPOINT=192.168.0.10:5025
//! POWER_CYCLER_CYCLE__ON_DURATION=30s
//! ```
//!
//! # Example file
//!
//! ```toml
//! [instrument]
//! endpoint = "TCPIP0::192.168.0.10::5025::SOCKET"
//! timeout = "5s"
//!
//! [indicator]
//! line = 17
//!
//! [cycle]
//! on_duration = "55s"
//! off_duration = "5s"
//!
//! [[channels]]
//! id = 1
//! voltage = 3.3
//! current = 0.1
//! ```

use crate::cycle::CycleTiming;
use crate::error::{AppResult, CyclerError};
use crate::instrument::{Channel, ChannelConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Config file read when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/power_cycler.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "POWER_CYCLER_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclerConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Power supply connection settings
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Indicator line settings
    #[serde(default)]
    pub indicator: IndicatorConfig,
    /// Hold durations and settle delays
    #[serde(default)]
    pub cycle: CycleConfig,
    /// Channels configured at initialization, in any order
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Power supply connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// `host`, `host:port`, `TCPIP0::host::port::SOCKET` or
    /// `TCPIP0::host::inst0::INSTR`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Round-trip timeout applied to connect, write and read
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Terminator expected at the end of each response
    #[serde(default = "default_terminator")]
    pub read_terminator: String,
    /// Terminator appended to each command
    #[serde(default = "default_terminator")]
    pub write_terminator: String,
    /// Highest channel number the instrument exposes
    #[serde(default = "default_max_channels")]
    pub max_channels: u8,
}

/// Indicator line settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// BCM GPIO number of the indicator line
    #[serde(default = "default_line")]
    pub line: u8,
}

/// Hold durations and settle delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Hold time with outputs ON
    #[serde(default = "default_on_duration", with = "humantime_serde")]
    pub on_duration: Duration,
    /// Hold time with outputs OFF
    #[serde(default = "default_off_duration", with = "humantime_serde")]
    pub off_duration: Duration,
    /// Wait after `*RST` before further commands
    #[serde(default = "default_reset_settle", with = "humantime_serde")]
    pub reset_settle: Duration,
    /// Wait after energizing before reading measurements
    #[serde(default = "default_output_settle", with = "humantime_serde")]
    pub output_settle: Duration,
    /// Stop cleanly after this many complete cycles (unbounded when absent)
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_endpoint() -> String {
    "TCPIP0::192.168.0.10::inst0::INSTR".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_terminator() -> String {
    "\n".to_string()
}

fn default_max_channels() -> u8 {
    4
}

fn default_line() -> u8 {
    17
}

fn default_on_duration() -> Duration {
    Duration::from_secs(55)
}

fn default_off_duration() -> Duration {
    Duration::from_secs(5)
}

fn default_reset_settle() -> Duration {
    Duration::from_secs(1)
}

fn default_output_settle() -> Duration {
    Duration::from_millis(500)
}

fn default_channels() -> Vec<ChannelConfig> {
    (1..=4)
        .map(|id| ChannelConfig::new(Channel::new(id), 25.0, 0.1))
        .collect()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_timeout(),
            read_terminator: default_terminator(),
            write_terminator: default_terminator(),
            max_channels: default_max_channels(),
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            line: default_line(),
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            on_duration: default_on_duration(),
            off_duration: default_off_duration(),
            reset_settle: default_reset_settle(),
            output_settle: default_output_settle(),
            max_cycles: None,
        }
    }
}

impl Default for CyclerConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            instrument: InstrumentConfig::default(),
            indicator: IndicatorConfig::default(),
            cycle: CycleConfig::default(),
            channels: default_channels(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl CyclerConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment, then validate.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment, then validate.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack without extraction, for callers that layer more on top.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(CyclerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - At least one channel, ids unique and within 1..=max_channels
    /// - Voltages and currents are finite and non-negative
    /// - Hold durations and the transport timeout are non-zero
    /// - `max_cycles`, when set, is positive
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(CyclerError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.instrument.endpoint.trim().is_empty() {
            return Err(CyclerError::Configuration(
                "instrument.endpoint must not be empty".to_string(),
            ));
        }

        if self.instrument.timeout.is_zero() {
            return Err(CyclerError::Configuration(
                "instrument.timeout must be greater than zero".to_string(),
            ));
        }

        if self.instrument.read_terminator.is_empty() || self.instrument.write_terminator.is_empty()
        {
            return Err(CyclerError::Configuration(
                "instrument terminators must not be empty".to_string(),
            ));
        }

        if self.channels.is_empty() {
            return Err(CyclerError::Configuration(
                "At least one channel must be configured".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for channel in &self.channels {
            let id = channel.id.number();
            if id == 0 || id > self.instrument.max_channels {
                return Err(CyclerError::Configuration(format!(
                    "Channel {} out of range. Must be 1-{}",
                    id, self.instrument.max_channels
                )));
            }
            if !ids.insert(id) {
                return Err(CyclerError::Configuration(format!(
                    "Duplicate channel id: {}",
                    id
                )));
            }
            if !channel.voltage.is_finite() || channel.voltage < 0.0 {
                return Err(CyclerError::Configuration(format!(
                    "Channel {} voltage {} must be a non-negative number",
                    id, channel.voltage
                )));
            }
            if !channel.current.is_finite() || channel.current < 0.0 {
                return Err(CyclerError::Configuration(format!(
                    "Channel {} current {} must be a non-negative number",
                    id, channel.current
                )));
            }
        }

        if self.cycle.on_duration.is_zero() || self.cycle.off_duration.is_zero() {
            return Err(CyclerError::Configuration(
                "cycle.on_duration and cycle.off_duration must be greater than zero".to_string(),
            ));
        }

        if self.cycle.max_cycles == Some(0) {
            return Err(CyclerError::Configuration(
                "cycle.max_cycles must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Channels sorted by ascending channel number.
    pub fn sorted_channels(&self) -> Vec<ChannelConfig> {
        let mut channels = self.channels.clone();
        channels.sort_by_key(|c| c.id);
        channels
    }

    /// Orchestrator timing from the `[cycle]` section
    pub fn timing(&self) -> CycleTiming {
        CycleTiming {
            on_duration: self.cycle.on_duration,
            off_duration: self.cycle.off_duration,
            reset_settle: self.cycle.reset_settle,
            output_settle: self.cycle.output_settle,
            max_cycles: self.cycle.max_cycles,
        }
    }
}
