//! Power-supply instrument driver and the data it exchanges.
//!
//! [`PowerSupply`] wraps any [`ScpiTransport`](crate::adapters::ScpiTransport)
//! with the fixed SCPI vocabulary in [`scpi`]. The one-shot control surface
//! used by the `control` subcommand lives in [`control`].

pub mod control;
pub mod power_supply;
pub mod scpi;

pub use control::{apply_control, ChannelRequest, ControlReport, ControlRequest};
pub use power_supply::PowerSupply;
pub use scpi::ScpiCommand;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output channel number on the instrument (1-based).
///
/// Range is instrument-dependent and is not checked here; an invalid channel
/// surfaces as an instrument-reported command failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(u8);

impl Channel {
    /// Channel by 1-based number
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    /// 1-based channel number
    pub const fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for Channel {
    fn from(number: u8) -> Self {
        Self(number)
    }
}

/// Desired settings for one channel, written through at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel these settings apply to
    pub id: Channel,
    /// Target output voltage in volts
    pub voltage: f64,
    /// Current limit in amperes
    pub current: f64,
    /// Whether the channel is armed for the master switch. Always set when
    /// loaded from configuration; the cycle arms every configured channel.
    #[serde(skip_deserializing, default = "default_armed")]
    pub armed: bool,
}

fn default_armed() -> bool {
    true
}

impl ChannelConfig {
    /// Armed channel settings
    pub fn new(id: Channel, voltage: f64, current: f64) -> Self {
        Self {
            id,
            voltage,
            current,
            armed: true,
        }
    }
}

/// Voltage/current snapshot read back from one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
}

impl Measurement {
    /// Decode a `READ?` response: exactly two comma-separated numeric fields,
    /// voltage first.
    pub fn parse(response: &str) -> Result<Self, String> {
        let fields: Vec<&str> = response.trim().split(',').map(str::trim).collect();
        if fields.len() != 2 {
            return Err(format!("expected 2 fields, got {}", fields.len()));
        }

        let voltage = parse_field(fields[0], "voltage")?;
        let current = parse_field(fields[1], "current")?;
        Ok(Self { voltage, current })
    }
}

fn parse_field(field: &str, name: &str) -> Result<f64, String> {
    let value: f64 = field
        .parse()
        .map_err(|_| format!("{} field '{}' is not a number", name, field))?;
    if !value.is_finite() {
        return Err(format!("{} field '{}' is not finite", name, field));
    }
    Ok(value)
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} V, {:.6} A", self.voltage, self.current)
    }
}
