//! Mock Hardware Implementations
//!
//! Provides a simulated digital output line for testing without a GPIO
//! header. Every completed write and the final release are recorded into a
//! [`BenchTrace`], interleaved with the simulated supply's SCPI traffic.

use super::{DigitalOutput, LineState};
use crate::adapters::{BenchTrace, TraceEntry};
use crate::error::{AppResult, CyclerError};
use tracing::debug;

/// Simulated output line
///
/// # Example
///
/// ```rust,ignore
/// let trace = BenchTrace::new();
/// let mut led = MockLine::new(17, trace.clone());
/// led.set(LineState::On)?;
/// assert_eq!(led.state(), LineState::On);
/// ```
pub struct MockLine {
    line: u8,
    trace: BenchTrace,
    state: LineState,
    released: bool,
    fail_on: Option<LineState>,
}

impl MockLine {
    /// Create a line that starts driven OFF
    pub fn new(line: u8, trace: BenchTrace) -> Self {
        Self {
            line,
            trace,
            state: LineState::Off,
            released: false,
            fail_on: None,
        }
    }

    /// Make every write of `state` fail, as a faulted driver would
    pub fn failing_on(mut self, state: LineState) -> Self {
        self.fail_on = Some(state);
        self
    }
}

impl DigitalOutput for MockLine {
    fn line(&self) -> u8 {
        self.line
    }

    fn set(&mut self, state: LineState) -> AppResult<()> {
        if self.released {
            return Err(CyclerError::io(self.line, "line already released"));
        }
        if self.fail_on == Some(state) {
            return Err(CyclerError::io(self.line, "simulated GPIO fault"));
        }
        self.state = state;
        self.trace.record(TraceEntry::Line {
            line: self.line,
            state,
        });
        debug!("Simulated GPIO{} -> {}", self.line, state);
        Ok(())
    }

    fn state(&self) -> LineState {
        self.state
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.state = LineState::Off;
        self.released = true;
        self.trace.record(TraceEntry::LineReleased { line: self.line });
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
