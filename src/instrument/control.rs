//! One-shot supply control for the `control` subcommand.
//!
//! Applies a single request (reset, master switch, one channel's settings,
//! status readout) to a connected supply and returns what was observed.
//! Unlike the cycle orchestrator there is no indicator line and nothing is
//! held or undone afterwards.

use super::{Channel, Measurement, PowerSupply};
use crate::adapters::ScpiTransport;
use crate::error::AppResult;
use tracing::info;

/// Settings for a single channel; unset fields are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRequest {
    /// Target channel
    pub channel: Channel,
    /// New voltage in volts
    pub voltage: Option<f64>,
    /// New current limit in amperes
    pub current: Option<f64>,
    /// `Some(true)` arms the channel and turns the master switch on;
    /// `Some(false)` disarms the channel only.
    pub output: Option<bool>,
}

/// Everything one `control` invocation asks for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlRequest {
    /// Send `*RST` first
    pub reset: bool,
    /// Master switch state to apply before channel settings
    pub master: Option<bool>,
    /// Per-channel changes
    pub channel: Option<ChannelRequest>,
    /// Channels to read back after all changes
    pub status: Vec<Channel>,
}

/// What a control request observed
#[derive(Debug, Clone, PartialEq)]
pub struct ControlReport {
    /// `*IDN?` answer
    pub identity: String,
    /// Status readout, ascending by channel
    pub readings: Vec<(Channel, Measurement)>,
}

/// Apply `request` in a fixed order: identify, reset, master switch, channel
/// settings, status readout.
pub async fn apply_control<T: ScpiTransport>(
    psu: &mut PowerSupply<T>,
    request: &ControlRequest,
) -> AppResult<ControlReport> {
    let identity = psu.identify().await?;
    info!("Connected: {}", identity);

    if request.reset {
        info!("Resetting instrument");
        psu.reset().await?;
    }

    if let Some(master) = request.master {
        info!("Master switch {}", if master { "ON" } else { "OFF" });
        psu.set_master_output(master).await?;
    }

    if let Some(ch) = &request.channel {
        psu.select_channel(ch.channel).await?;
        if let Some(volts) = ch.voltage {
            info!("Channel {}: voltage {} V", ch.channel, volts);
            psu.set_voltage(volts).await?;
        }
        if let Some(amps) = ch.current {
            info!("Channel {}: current limit {} A", ch.channel, amps);
            psu.set_current_limit(amps).await?;
        }
        match ch.output {
            Some(true) => {
                info!("Channel {}: output ON", ch.channel);
                psu.arm_output(true).await?;
                psu.set_master_output(true).await?;
            }
            Some(false) => {
                info!("Channel {}: output OFF", ch.channel);
                psu.arm_output(false).await?;
            }
            None => {}
        }
    }

    let readings = if request.status.is_empty() {
        Vec::new()
    } else {
        psu.status(&request.status).await
    };

    Ok(ControlReport { identity, readings })
}
