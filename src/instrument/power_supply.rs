//! Multi-channel SCPI power supply driver
//!
//! Written against the Rohde & Schwarz NGP800 command set, which models
//! "output enabled" as two independent switches:
//!
//! - a per-channel **arm** (`OUTPut:SELect`), which marks the selected channel
//!   eligible for output, and
//! - a global **master** (`OUTPut:GENeral:STATe`), which energizes every armed
//!   channel at once.
//!
//! The instrument also keeps a "currently selected channel". The primitive
//! operations (`select_channel`, `set_voltage`, ...) act on that selection and
//! mirror the wire protocol one-to-one. Callers that do not want to track
//! the selection use the channel-explicit operations (`configure_channel`,
//! `measure`, `set_channel_output`), which always select before acting.
//!
//! # Example Usage
//!
//! ```no_run
//! use power_cycler::adapters::TcpScpiAdapterBuilder;
//! use power_cycler::instrument::{Channel, ChannelConfig, PowerSupply};
//!
//! # async fn example() -> power_cycler::AppResult<()> {
//! let adapter = TcpScpiAdapterBuilder::new("192.168.0.10").connect().await?;
//! let mut psu = PowerSupply::new(adapter);
//!
//! println!("Connected to {}", psu.identify().await?);
//! psu.reset().await?;
//! psu.set_master_output(false).await?;
//! psu.configure_channel(&ChannelConfig::new(Channel::new(1), 3.3, 0.1)).await?;
//! psu.set_master_output(true).await?;
//!
//! let reading = psu.measure(Channel::new(1)).await?;
//! println!("Output 1: {}", reading);
//! psu.close().await;
//! # Ok(())
//! # }
//! ```

use super::{Channel, ChannelConfig, Measurement, ScpiCommand};
use crate::adapters::ScpiTransport;
use crate::error::{AppResult, CyclerError};
use std::time::Duration;
use tracing::debug;

/// Default wait after `*RST` before the instrument accepts further commands
pub const DEFAULT_RESET_SETTLE: Duration = Duration::from_secs(1);

/// Driver for a multi-channel SCPI power supply
///
/// Owns its transport exclusively; dropping or closing the driver ends the
/// session.
pub struct PowerSupply<T: ScpiTransport> {
    transport: T,
    reset_settle: Duration,
    selected: Option<Channel>,
}

impl<T: ScpiTransport> PowerSupply<T> {
    /// Wrap an open transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            reset_settle: DEFAULT_RESET_SETTLE,
            selected: None,
        }
    }

    /// Override the delay observed after `*RST`
    pub fn with_reset_settle(mut self, reset_settle: Duration) -> Self {
        self.reset_settle = reset_settle;
        self
    }

    /// Channel targeted by the primitive per-channel operations, if known
    pub fn selected_channel(&self) -> Option<Channel> {
        self.selected
    }

    /// Whether the session is still usable
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Transport endpoint, for log lines
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    async fn write(&mut self, command: ScpiCommand) -> AppResult<()> {
        self.transport.send(&command.to_string()).await
    }

    async fn ask(&mut self, command: ScpiCommand) -> AppResult<String> {
        self.transport.query(&command.to_string()).await
    }

    /// Query instrument identity (`*IDN?`)
    pub async fn identify(&mut self) -> AppResult<String> {
        self.ask(ScpiCommand::Identify).await
    }

    /// Restore instrument defaults (`*RST`) and wait the reset settle delay
    ///
    /// Clears the known channel selection; the instrument's own selection
    /// after reset is model-specific.
    pub async fn reset(&mut self) -> AppResult<()> {
        self.write(ScpiCommand::Reset).await?;
        self.selected = None;
        if !self.reset_settle.is_zero() {
            debug!("Waiting {:?} for reset to complete", self.reset_settle);
            tokio::time::sleep(self.reset_settle).await;
        }
        Ok(())
    }

    /// Master switch for all armed outputs
    pub async fn set_master_output(&mut self, enabled: bool) -> AppResult<()> {
        self.write(ScpiCommand::MasterOutput(enabled)).await
    }

    /// Select the channel targeted by subsequent per-channel operations
    ///
    /// The channel number is not validated locally; an out-of-range channel
    /// fails with the instrument's error.
    pub async fn select_channel(&mut self, channel: Channel) -> AppResult<()> {
        self.write(ScpiCommand::SelectChannel(channel)).await?;
        self.selected = Some(channel);
        Ok(())
    }

    /// Set the target voltage (V) of the selected channel
    pub async fn set_voltage(&mut self, volts: f64) -> AppResult<()> {
        self.write(ScpiCommand::Voltage(volts)).await
    }

    /// Set the current limit (A) of the selected channel
    pub async fn set_current_limit(&mut self, amps: f64) -> AppResult<()> {
        self.write(ScpiCommand::CurrentLimit(amps)).await
    }

    /// Arm or disarm the selected channel for the master switch
    ///
    /// Arming alone does not energize the output.
    pub async fn arm_output(&mut self, enabled: bool) -> AppResult<()> {
        self.write(ScpiCommand::ArmOutput(enabled)).await
    }

    /// Read voltage and current of the selected channel (`READ?`)
    ///
    /// # Errors
    /// - `CyclerError::Command` if the query fails
    /// - `CyclerError::Parse` unless the response holds exactly two numbers
    pub async fn read_measurement(&mut self) -> AppResult<Measurement> {
        let command = ScpiCommand::ReadMeasurement;
        let response = self.ask(command).await?;
        Measurement::parse(&response).map_err(|reason| CyclerError::Parse {
            command: command.to_string(),
            response,
            reason,
        })
    }

    /// Select `config.id`, then write voltage, current limit and arm state,
    /// each exactly once and in that order
    pub async fn configure_channel(&mut self, config: &ChannelConfig) -> AppResult<()> {
        debug!(
            "Configuring channel {}: {} V, {} A, armed={}",
            config.id, config.voltage, config.current, config.armed
        );
        self.select_channel(config.id).await?;
        self.set_voltage(config.voltage).await?;
        self.set_current_limit(config.current).await?;
        self.arm_output(config.armed).await
    }

    /// Select `channel`, then read its measurement
    pub async fn measure(&mut self, channel: Channel) -> AppResult<Measurement> {
        self.select_channel(channel).await?;
        self.read_measurement().await
    }

    /// Select `channel`, then arm or disarm it
    pub async fn set_channel_output(&mut self, channel: Channel, enabled: bool) -> AppResult<()> {
        self.select_channel(channel).await?;
        self.arm_output(enabled).await
    }

    /// Measure each channel in ascending order
    ///
    /// Channels that cannot be read (absent on smaller models, or returning a
    /// malformed response) are skipped.
    pub async fn status(&mut self, channels: &[Channel]) -> Vec<(Channel, Measurement)> {
        let mut sorted = channels.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut readings = Vec::with_capacity(sorted.len());
        for channel in sorted {
            match self.measure(channel).await {
                Ok(measurement) => readings.push((channel, measurement)),
                Err(e) => debug!("Skipping channel {}: {}", channel, e),
            }
        }
        readings
    }

    /// Close the session. Idempotent.
    pub async fn close(&mut self) {
        self.transport.close().await;
        self.selected = None;
    }
}
