//! Fixed SCPI vocabulary spoken to the power supply.
//!
//! Each variant renders to exactly one command line (without terminator).
//! Queries end in `?` and expect one response line.

use super::Channel;
use std::fmt;

/// Commands this crate sends to the supply; `Display` renders the wire text
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScpiCommand {
    /// `*IDN?`
    Identify,
    /// `*RST`
    Reset,
    /// `OUTPut:GENeral:STATe {ON|OFF}` - master switch for all armed channels
    MasterOutput(bool),
    /// `INSTrument:SELect {n}`
    SelectChannel(Channel),
    /// `SOURce:VOLTage:LEVel:IMMediate:AMPlitude {v}`
    Voltage(f64),
    /// `SOURce:CURRent:LEVel:IMMediate:AMPlitude {i}`
    CurrentLimit(f64),
    /// `OUTPut:SELect {ON|OFF}` - per-channel arm
    ArmOutput(bool),
    /// `READ?` - voltage and current of the selected channel
    ReadMeasurement,
}

impl ScpiCommand {
    /// `true` if the instrument answers this command
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Identify | Self::ReadMeasurement)
    }
}

fn on_off(state: bool) -> &'static str {
    if state {
        "ON"
    } else {
        "OFF"
    }
}

impl fmt::Display for ScpiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identify => f.write_str("*IDN?"),
            Self::Reset => f.write_str("*RST"),
            Self::MasterOutput(state) => write!(f, "OUTPut:GENeral:STATe {}", on_off(*state)),
            Self::SelectChannel(channel) => write!(f, "INSTrument:SELect {}", channel),
            Self::Voltage(volts) => write!(f, "SOURce:VOLTage:LEVel:IMMediate:AMPlitude {}", volts),
            Self::CurrentLimit(amps) => {
                write!(f, "SOURce:CURRent:LEVel:IMMediate:AMPlitude {}", amps)
            }
            Self::ArmOutput(state) => write!(f, "OUTPut:SELect {}", on_off(*state)),
            Self::ReadMeasurement => f.write_str("READ?"),
        }
    }
}
