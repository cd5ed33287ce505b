//! Raspberry Pi GPIO output line
//!
//! Uses `rppal` when built with `--features gpio`. Without the feature the
//! line cannot be opened and reports an `Io` error naming the missing
//! feature, so the rest of the crate builds and tests on any host.
//!
//! Wiring used on the bench (purely descriptive):
//!
//! ```text
//! GPIO17 ---[330 Ω]--- LED(+) --- LED(-) --- GND
//! ```

use super::{DigitalOutput, LineState};
use crate::error::{AppResult, CyclerError};
#[cfg(feature = "gpio")]
use tracing::{debug, warn};

/// GPIO output line driven through `/dev/gpiomem`
#[cfg(feature = "gpio")]
pub struct GpioLine {
    line: u8,
    pin: Option<rppal::gpio::OutputPin>,
    state: LineState,
}

/// GPIO output line (unavailable: built without the `gpio` feature)
#[cfg(not(feature = "gpio"))]
#[allow(dead_code)] // never constructed without the gpio feature
pub struct GpioLine {
    line: u8,
}

#[cfg(feature = "gpio")]
impl GpioLine {
    /// Claim BCM line `line` as an output, driven low (OFF) immediately
    ///
    /// # Errors
    /// `CyclerError::Io` if the GPIO peripheral is absent (not a Raspberry
    /// Pi), inaccessible, or the line is already claimed.
    pub fn open(line: u8) -> AppResult<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| CyclerError::io(line, e))?;
        let pin = gpio
            .get(line)
            .map_err(|e| CyclerError::io(line, e))?
            .into_output_low();
        debug!("GPIO{} claimed as output (OFF)", line);

        Ok(Self {
            line,
            pin: Some(pin),
            state: LineState::Off,
        })
    }
}

#[cfg(feature = "gpio")]
impl DigitalOutput for GpioLine {
    fn line(&self) -> u8 {
        self.line
    }

    fn set(&mut self, state: LineState) -> AppResult<()> {
        let pin = self
            .pin
            .as_mut()
            .ok_or_else(|| CyclerError::io(self.line, "line already released"))?;
        match state {
            LineState::On => pin.set_high(),
            LineState::Off => pin.set_low(),
        }
        self.state = state;
        debug!("GPIO{} -> {}", self.line, state);
        Ok(())
    }

    fn state(&self) -> LineState {
        self.state
    }

    fn release(&mut self) {
        if let Some(mut pin) = self.pin.take() {
            pin.set_low();
            self.state = LineState::Off;
            // Dropping the pin restores its previous mode
            drop(pin);
            debug!("GPIO{} released", self.line);
        }
    }

    fn is_released(&self) -> bool {
        self.pin.is_none()
    }
}

#[cfg(feature = "gpio")]
impl Drop for GpioLine {
    fn drop(&mut self) {
        if self.pin.is_some() {
            warn!("GPIO{} dropped without release; forcing OFF", self.line);
            self.release();
        }
    }
}

#[cfg(not(feature = "gpio"))]
impl GpioLine {
    /// Always fails: GPIO support was not compiled in
    pub fn open(line: u8) -> AppResult<Self> {
        Err(CyclerError::io(
            line,
            "GPIO support not enabled. Rebuild with --features gpio",
        ))
    }
}

#[cfg(not(feature = "gpio"))]
impl DigitalOutput for GpioLine {
    fn line(&self) -> u8 {
        self.line
    }

    fn set(&mut self, _state: LineState) -> AppResult<()> {
        Err(CyclerError::io(
            self.line,
            "GPIO support not enabled. Rebuild with --features gpio",
        ))
    }

    fn state(&self) -> LineState {
        LineState::Off
    }

    fn release(&mut self) {}

    fn is_released(&self) -> bool {
        true
    }
}
