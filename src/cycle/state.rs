//! Cycle state machine states, published events and run outcomes.

use crate::error::CyclerError;
use crate::instrument::{Channel, Measurement};
use std::fmt;
use std::time::Duration;

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// Constructed, `run` not called yet
    Uninitialized,
    /// Claiming drivers and writing channel settings
    Initializing,
    /// Supply and indicator ON
    Energized,
    /// Supply and indicator OFF
    DeEnergized,
    /// Turning everything OFF and releasing drivers
    ShuttingDown,
    /// Final state; the cycler cannot run again
    Terminated,
}

impl CycleState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// `ShuttingDown` is reachable from every non-terminal state;
    /// `Terminated` only from `ShuttingDown`, or from `Initializing` when a
    /// driver could not be constructed.
    pub fn can_transition_to(self, next: CycleState) -> bool {
        use CycleState::*;
        match (self, next) {
            (Terminated, _) => false,
            (ShuttingDown, Terminated) => true,
            (ShuttingDown, _) => false,
            (_, ShuttingDown) => true,
            (Uninitialized, Initializing) => true,
            (Initializing, Energized) | (Initializing, Terminated) => true,
            (Energized, DeEnergized) => true,
            (DeEnergized, Energized) => true,
            _ => false,
        }
    }

    /// `true` once nothing further can happen
    pub fn is_terminal(self) -> bool {
        self == CycleState::Terminated
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initializing => "Initializing",
            Self::Energized => "Energized",
            Self::DeEnergized => "DeEnergized",
            Self::ShuttingDown => "ShuttingDown",
            Self::Terminated => "Terminated",
        })
    }
}

/// Progress published by the orchestrator on its broadcast channel
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// The state machine moved
    StateChanged {
        /// Previous state
        from: CycleState,
        /// New state
        to: CycleState,
    },
    /// `*IDN?` answer received while constructing the supply driver
    Identified {
        /// Identity string as returned
        identity: String,
    },
    /// A new energize/de-energize cycle begins (counter starts at 1)
    CycleStarted {
        /// Cycle number
        cycle: u64,
    },
    /// One channel was read back after energizing
    Measured {
        /// Cycle number
        cycle: u64,
        /// Channel read
        channel: Channel,
        /// Decoded reading
        measurement: Measurement,
    },
    /// A measurement response could not be decoded; the cycle continues
    MeasurementFailed {
        /// Cycle number
        cycle: u64,
        /// Channel read
        channel: Channel,
        /// Decode failure
        error: String,
    },
    /// A hold is about to start; emitted after every command of the transition
    HoldStarted {
        /// Cycle number
        cycle: u64,
        /// `Energized` or `DeEnergized`
        state: CycleState,
        /// Hold length
        duration: Duration,
    },
    /// A best-effort shutdown step failed; cleanup continued
    ShutdownStepFailed {
        /// Step name, e.g. `"master output OFF"`
        step: &'static str,
        /// Failure text
        error: String,
    },
}

/// How a run ended
#[derive(Debug)]
pub enum CycleOutcome {
    /// Stopped by the cancellation token
    Cancelled {
        /// Complete cycles before the stop
        cycles: u64,
    },
    /// Reached the configured `max_cycles`
    Completed {
        /// Complete cycles run
        cycles: u64,
    },
    /// A driver, transport or construction failure ended the run
    Failed {
        /// The failure that ended the run
        error: CyclerError,
        /// Complete cycles before the failure
        cycles: u64,
    },
}

impl CycleOutcome {
    /// Process exit status: 0 for clean stops, 1 for failures
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled { .. } | Self::Completed { .. } => 0,
            Self::Failed { .. } => 1,
        }
    }

    /// Number of complete (ON hold + OFF hold) cycles
    pub fn cycles(&self) -> u64 {
        match self {
            Self::Cancelled { cycles } | Self::Completed { cycles } | Self::Failed { cycles, .. } => {
                *cycles
            }
        }
    }

    /// `true` for `Cancelled` and `Completed`
    pub fn is_clean(&self) -> bool {
        self.exit_code() == 0
    }

    /// The failure, if the run failed
    pub fn error(&self) -> Option<&CyclerError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}
