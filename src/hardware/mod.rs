//! Digital output lines
//!
//! A [`DigitalOutput`] drives one binary line (an indicator LED, a relay
//! coil, any on/off load). Implementations:
//!
//! - [`GpioLine`]: Raspberry Pi GPIO through `rppal` (feature `gpio`)
//! - [`MockLine`]: simulated line recording into a
//!   [`BenchTrace`](crate::adapters::BenchTrace)

pub mod gpio;
pub mod mock;

pub use gpio::GpioLine;
pub use mock::MockLine;

use crate::error::AppResult;
use std::fmt;

/// Logical state of a digital output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineState {
    /// Line driven high
    On,
    /// Line driven low
    #[default]
    Off,
}

impl LineState {
    /// `true` for [`LineState::On`]
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for LineState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::Off => "OFF",
        })
    }
}

/// One binary output line
///
/// ## Guarantees
/// - From construction until `release()` the line is driven to a defined
///   level; it is never left floating.
/// - `state()` reports the last *completed* write. A failed `set` leaves the
///   reported state unchanged.
/// - `release()` drives the line OFF and then relinquishes it. It is
///   idempotent and safe even if no `set` ever succeeded.
pub trait DigitalOutput: Send {
    /// Line identifier (BCM GPIO number)
    fn line(&self) -> u8;

    /// Drive the line.
    ///
    /// # Errors
    /// `CyclerError::Io` if the line has been released or the GPIO
    /// subsystem faults.
    fn set(&mut self, state: LineState) -> AppResult<()>;

    /// Last completed write; OFF before the first one
    fn state(&self) -> LineState;

    /// Force OFF, then give the line back. Never fails.
    fn release(&mut self);

    /// `true` after [`release`](Self::release)
    fn is_released(&self) -> bool;
}
