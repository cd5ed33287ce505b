//! Simulated SCPI power supply
//!
//! `MockScpiAdapter` answers the power-supply command set without hardware.
//! It keeps a small model of the instrument (selected channel, per-channel
//! setpoints and arm flags, master switch) so `READ?` returns plausible
//! values, and it records every accepted command into a shared
//! [`BenchTrace`]. The simulated indicator line records into the same trace,
//! which makes cross-resource ordering directly assertable.
//!
//! # Example
//!
//! ```rust,ignore
//! let trace = BenchTrace::new();
//! let mut adapter = MockScpiAdapter::new(trace.clone())
//!     .with_failure("SOURce:VOLTage", 2); // second voltage write fails
//! adapter.send("*RST").await?;
//! assert_eq!(trace.commands(), vec!["*RST"]);
//! ```

use super::ScpiTransport;
use crate::error::{AppResult, CyclerError};
use crate::hardware::LineState;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// One observable action on the bench.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEntry {
    /// A command or query accepted by the simulated instrument
    Scpi(String),
    /// A completed write to the simulated indicator line
    Line {
        /// BCM GPIO number
        line: u8,
        /// Level written
        state: LineState,
    },
    /// The instrument session was closed
    SessionClosed,
    /// The indicator line was released
    LineReleased {
        /// BCM GPIO number
        line: u8,
    },
}

/// Ordered, shared record of everything the simulated bench observed.
#[derive(Debug, Clone, Default)]
pub struct BenchTrace {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
}

impl BenchTrace {
    /// Empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry
    pub fn record(&self, entry: TraceEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Snapshot of all entries in order.
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// SCPI commands only, in order.
    pub fn commands(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                TraceEntry::Scpi(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Number of entries equal to `entry`
    pub fn count(&self, entry: &TraceEntry) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SimChannel {
    voltage: f64,
    current_limit: f64,
    armed: bool,
}

#[derive(Debug)]
struct FailureRule {
    prefix: String,
    occurrence: usize,
    seen: usize,
}

/// Simulated SCPI power supply
pub struct MockScpiAdapter {
    trace: BenchTrace,
    identity: String,
    channel_count: u8,
    load_ohms: f64,
    responses: HashMap<String, VecDeque<String>>,
    failures: Vec<FailureRule>,
    open: bool,
    master: bool,
    selected: Option<u8>,
    channels: HashMap<u8, SimChannel>,
}

impl MockScpiAdapter {
    /// Create a simulated 4-channel supply driving a 50 Ω load on every output
    pub fn new(trace: BenchTrace) -> Self {
        Self {
            trace,
            identity: "Rohde&Schwarz,NGP804,000000,1.0 (simulated)".to_string(),
            channel_count: 4,
            load_ohms: 50.0,
            responses: HashMap::new(),
            failures: Vec::new(),
            open: true,
            master: false,
            selected: None,
            channels: HashMap::new(),
        }
    }

    /// Answer `*IDN?` with `identity`
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Number of channels the simulated model has; selecting above it fails
    pub fn with_channel_count(mut self, channel_count: u8) -> Self {
        self.channel_count = channel_count;
        self
    }

    /// Queue a scripted response for `command`; consumed in FIFO order before
    /// the simulated answer is used.
    pub fn with_response(mut self, command: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .entry(command.into())
            .or_default()
            .push_back(response.into());
        self
    }

    /// Fail the `occurrence`-th (1-based) command starting with `prefix`.
    pub fn with_failure(mut self, prefix: impl Into<String>, occurrence: usize) -> Self {
        self.failures.push(FailureRule {
            prefix: prefix.into(),
            occurrence,
            seen: 0,
        });
        self
    }

    /// Current simulated master switch state
    pub fn master_enabled(&self) -> bool {
        self.master
    }

    fn check_open(&self, command: &str) -> AppResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(CyclerError::command(command, "session closed"))
        }
    }

    fn check_injected_failure(&mut self, command: &str) -> AppResult<()> {
        for rule in &mut self.failures {
            if command.starts_with(&rule.prefix) {
                rule.seen += 1;
                if rule.seen == rule.occurrence {
                    return Err(CyclerError::command(command, "simulated instrument fault"));
                }
            }
        }
        Ok(())
    }

    /// Apply a write command to the instrument model.
    fn apply(&mut self, command: &str) -> AppResult<()> {
        let (header, argument) = match command.split_once(' ') {
            Some((header, argument)) => (header, argument.trim()),
            None => (command, ""),
        };

        match header {
            "*RST" => {
                self.master = false;
                self.selected = None;
                self.channels.clear();
            }
            "OUTPut:GENeral:STATe" => self.master = argument == "ON",
            "INSTrument:SELect" => {
                let channel = argument
                    .parse::<u8>()
                    .ok()
                    .filter(|n| (1..=self.channel_count).contains(n))
                    .ok_or_else(|| CyclerError::command(command, "-222,\"Data out of range\""))?;
                self.selected = Some(channel);
            }
            "SOURce:VOLTage:LEVel:IMMediate:AMPlitude" => {
                let volts = parse_number(command, argument)?;
                self.selected_channel(command)?.voltage = volts;
            }
            "SOURce:CURRent:LEVel:IMMediate:AMPlitude" => {
                let amps = parse_number(command, argument)?;
                self.selected_channel(command)?.current_limit = amps;
            }
            "OUTPut:SELect" => {
                let armed = argument == "ON";
                self.selected_channel(command)?.armed = armed;
            }
            _ => debug!("Simulated supply ignoring '{}'", command),
        }
        Ok(())
    }

    fn selected_channel(&mut self, command: &str) -> AppResult<&mut SimChannel> {
        let selected = self
            .selected
            .ok_or_else(|| CyclerError::command(command, "no channel selected"))?;
        Ok(self.channels.entry(selected).or_default())
    }

    fn answer(&mut self, command: &str) -> AppResult<String> {
        if let Some(response) = self
            .responses
            .get_mut(command)
            .and_then(VecDeque::pop_front)
        {
            return Ok(response);
        }

        match command {
            "*IDN?" => Ok(self.identity.clone()),
            "READ?" => {
                let channel = self
                    .selected
                    .ok_or_else(|| CyclerError::command(command, "no channel selected"))?;
                let sim = self.channels.get(&channel).copied().unwrap_or_default();
                let (voltage, current) = if self.master && sim.armed {
                    let current = (sim.voltage / self.load_ohms).min(sim.current_limit);
                    (sim.voltage, current)
                } else {
                    (0.0, 0.0)
                };
                Ok(format!("{:.4},{:.6}", voltage, current))
            }
            _ => Err(CyclerError::command(command, "no response from simulated instrument")),
        }
    }
}

fn parse_number(command: &str, argument: &str) -> AppResult<f64> {
    argument
        .parse::<f64>()
        .map_err(|_| CyclerError::command(command, "-224,\"Illegal parameter value\""))
}

#[async_trait]
impl ScpiTransport for MockScpiAdapter {
    async fn send(&mut self, command: &str) -> AppResult<()> {
        self.check_open(command)?;
        self.check_injected_failure(command)?;
        self.apply(command)?;
        self.trace.record(TraceEntry::Scpi(command.to_string()));
        Ok(())
    }

    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.check_open(command)?;
        self.check_injected_failure(command)?;
        let response = self.answer(command)?;
        self.trace.record(TraceEntry::Scpi(command.to_string()));
        Ok(response)
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.trace.record(TraceEntry::SessionClosed);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn endpoint(&self) -> &str {
        "simulated"
    }
}
