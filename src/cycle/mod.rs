//! Periodic power-cycle orchestration
//!
//! [`PowerCycler`] owns one power-supply driver and one digital output and
//! drives them through
//!
//! ```text
//! Uninitialized -> Initializing -> (Energized -> DeEnergized)* -> ShuttingDown -> Terminated
//! ```
//!
//! Turning ON always enables the supply before the indicator; turning OFF
//! always disables the supply before the indicator. Holds and settle delays
//! wait on a [`CancellationToken`](tokio_util::sync::CancellationToken), so an
//! operator interrupt preempts them immediately. Whatever the exit path, the
//! supply's master output and the indicator are driven OFF and both drivers
//! are released exactly once.

pub mod bench;
pub mod interrupt;
pub mod orchestrator;
pub mod state;

pub use bench::{Bench, HardwareBench, SimulatedBench};
pub use interrupt::install_interrupt_handler;
pub use orchestrator::PowerCycler;
pub use state::{CycleEvent, CycleOutcome, CycleState};

use std::time::Duration;

/// Hold durations and settle delays for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTiming {
    /// Time held in `Energized`, counted after measurements are read
    pub on_duration: Duration,
    /// Time held in `DeEnergized`
    pub off_duration: Duration,
    /// Wait after `*RST` before configuring channels
    pub reset_settle: Duration,
    /// Wait after energizing before reading measurements
    pub output_settle: Duration,
    /// Stop cleanly after this many complete cycles
    pub max_cycles: Option<u64>,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self {
            on_duration: Duration::from_secs(55),
            off_duration: Duration::from_secs(5),
            reset_settle: Duration::from_secs(1),
            output_settle: Duration::from_millis(500),
            max_cycles: None,
        }
    }
}
