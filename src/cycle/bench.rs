//! Bench factories
//!
//! A [`Bench`] hands the orchestrator its two drivers. The orchestrator opens
//! the indicator first and connects the supply second, so a missing GPIO
//! header never leaves an instrument session half-open.

use crate::adapters::{
    BenchTrace, MockScpiAdapter, ScpiTransport, TcpScpiAdapter, TcpScpiAdapterBuilder,
};
use crate::config::InstrumentConfig;
use crate::error::{AppResult, CyclerError};
use crate::hardware::{DigitalOutput, GpioLine, MockLine};
use async_trait::async_trait;

/// Source of the transport and digital output for one run
#[async_trait]
pub trait Bench: Send {
    /// Instrument session handed to the supply driver
    type Transport: ScpiTransport;
    /// Indicator line
    type Output: DigitalOutput;

    /// Claim the indicator line, driven OFF
    fn open_output(&mut self) -> AppResult<Self::Output>;

    /// Open the instrument session
    async fn connect_supply(&mut self) -> AppResult<Self::Transport>;
}

/// Real instrument over TCP plus a Raspberry Pi GPIO line
#[derive(Debug, Clone)]
pub struct HardwareBench {
    instrument: InstrumentConfig,
    line: u8,
}

impl HardwareBench {
    /// Bench for the configured instrument and BCM line
    pub fn new(instrument: InstrumentConfig, line: u8) -> Self {
        Self { instrument, line }
    }
}

#[async_trait]
impl Bench for HardwareBench {
    type Transport = TcpScpiAdapter;
    type Output = GpioLine;

    fn open_output(&mut self) -> AppResult<GpioLine> {
        GpioLine::open(self.line)
    }

    async fn connect_supply(&mut self) -> AppResult<TcpScpiAdapter> {
        TcpScpiAdapterBuilder::new(self.instrument.endpoint.clone())
            .with_timeout(self.instrument.timeout)
            .with_read_terminator(self.instrument.read_terminator.clone())
            .with_write_terminator(self.instrument.write_terminator.clone())
            .connect()
            .await
    }
}

/// Simulated supply and indicator sharing one [`BenchTrace`]
///
/// Used by `--simulate` and by the scenario tests. Each driver can be handed
/// out once; a second run against the same bench fails construction.
pub struct SimulatedBench {
    trace: BenchTrace,
    line: u8,
    adapter: Option<MockScpiAdapter>,
    output: Option<MockLine>,
    connect_error: Option<String>,
    output_error: Option<String>,
}

impl SimulatedBench {
    /// Default simulated supply and line, both recording into `trace`
    pub fn new(trace: BenchTrace, line: u8) -> Self {
        Self {
            adapter: Some(MockScpiAdapter::new(trace.clone())),
            output: Some(MockLine::new(line, trace.clone())),
            trace,
            line,
            connect_error: None,
            output_error: None,
        }
    }

    /// Replace the simulated supply (e.g. one with injected failures)
    pub fn with_adapter(mut self, adapter: MockScpiAdapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Replace the simulated indicator line
    pub fn with_output(mut self, output: MockLine) -> Self {
        self.line = output.line();
        self.output = Some(output);
        self
    }

    /// Make the instrument session fail to open
    pub fn with_unreachable_supply(mut self, reason: impl Into<String>) -> Self {
        self.connect_error = Some(reason.into());
        self
    }

    /// Make the indicator line fail to open
    pub fn with_unavailable_output(mut self, reason: impl Into<String>) -> Self {
        self.output_error = Some(reason.into());
        self
    }

    /// Shared trace of everything the bench observed
    pub fn trace(&self) -> BenchTrace {
        self.trace.clone()
    }
}

#[async_trait]
impl Bench for SimulatedBench {
    type Transport = MockScpiAdapter;
    type Output = MockLine;

    fn open_output(&mut self) -> AppResult<MockLine> {
        if let Some(reason) = &self.output_error {
            return Err(CyclerError::io(self.line, reason));
        }
        self.output
            .take()
            .ok_or_else(|| CyclerError::io(self.line, "line already claimed"))
    }

    async fn connect_supply(&mut self) -> AppResult<MockScpiAdapter> {
        if let Some(reason) = &self.connect_error {
            return Err(CyclerError::connect("simulated", reason));
        }
        self.adapter
            .take()
            .ok_or_else(|| CyclerError::connect("simulated", "session already open"))
    }
}
