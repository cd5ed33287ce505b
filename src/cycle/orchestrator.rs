//! The power-cycle state machine.

use super::bench::Bench;
use super::state::{CycleEvent, CycleOutcome, CycleState};
use super::CycleTiming;
use crate::error::{AppResult, CyclerError};
use crate::hardware::{DigitalOutput, LineState};
use crate::instrument::{Channel, ChannelConfig, PowerSupply};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

enum StopReason {
    Cancelled,
    Completed,
}

/// Drives one supply and one indicator line through repeated ON/OFF cycles
///
/// # Example
///
/// ```rust,ignore
/// let cancel = CancellationToken::new();
/// install_interrupt_handler(cancel.clone());
///
/// let bench = HardwareBench::new(config.instrument.clone(), config.indicator.line);
/// let mut cycler = PowerCycler::new(bench, config.sorted_channels(), config.timing());
/// let outcome = cycler.run(&cancel).await;
/// std::process::exit(outcome.exit_code());
/// ```
pub struct PowerCycler<B: Bench> {
    bench: B,
    channels: Vec<ChannelConfig>,
    timing: CycleTiming,
    state: CycleState,
    cycle: u64,
    completed: u64,
    supply: Option<PowerSupply<B::Transport>>,
    output: Option<B::Output>,
    events: broadcast::Sender<CycleEvent>,
}

impl<B: Bench> PowerCycler<B> {
    /// Channels are configured and measured in ascending id order regardless
    /// of the order given here.
    pub fn new(bench: B, mut channels: Vec<ChannelConfig>, timing: CycleTiming) -> Self {
        channels.sort_by_key(|c| c.id);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bench,
            channels,
            timing,
            state: CycleState::Uninitialized,
            cycle: 0,
            completed: 0,
            supply: None,
            output: None,
            events,
        }
    }

    /// Receive progress events; subscribe before calling [`run`](Self::run)
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.events.subscribe()
    }

    /// Current state
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Index of the cycle in progress, 0 before the first one starts
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Run until cancelled, until `max_cycles` complete, or until a failure.
    ///
    /// Always leaves the supply's master output and the indicator OFF and
    /// both drivers released. A cycler runs once; a second call reports a
    /// `State` error without touching the hardware.
    pub async fn run(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        if self.state != CycleState::Uninitialized {
            return CycleOutcome::Failed {
                error: CyclerError::State(format!("cycler already ran (state {})", self.state)),
                cycles: self.completed,
            };
        }
        self.transition(CycleState::Initializing);

        if let Err(error) = self.construct().await {
            error!("Failed to open drivers: {}", error);
            self.release_drivers().await;
            self.transition(CycleState::Terminated);
            return CycleOutcome::Failed { error, cycles: 0 };
        }

        let result = self.drive(cancel).await;
        if let Err(e) = &result {
            error!("Cycling stopped in state {}: {}", self.state, e);
        }
        self.shutdown().await;

        let cycles = self.completed;
        match result {
            Ok(StopReason::Cancelled) => {
                info!("Stopped by operator after {} complete cycles", cycles);
                CycleOutcome::Cancelled { cycles }
            }
            Ok(StopReason::Completed) => {
                info!("Completed {} cycles", cycles);
                CycleOutcome::Completed { cycles }
            }
            Err(error) => CycleOutcome::Failed { error, cycles },
        }
    }

    async fn construct(&mut self) -> AppResult<()> {
        let output = self.bench.open_output()?;
        info!("Indicator on GPIO{} ready (OFF)", output.line());
        self.output = Some(output);

        let transport = self.bench.connect_supply().await?;
        // Reset settle is awaited here so that it can be interrupted
        let supply = self
            .supply
            .insert(PowerSupply::new(transport).with_reset_settle(Duration::ZERO));
        let identity = supply.identify().await?;
        info!("Connected to: {}", identity);
        self.emit(CycleEvent::Identified { identity });
        Ok(())
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> AppResult<StopReason> {
        if !self.initialize(cancel).await? {
            return Ok(StopReason::Cancelled);
        }

        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if let Some(max) = self.timing.max_cycles {
                if self.completed >= max {
                    return Ok(StopReason::Completed);
                }
            }

            self.cycle += 1;
            info!("--- Cycle {} ---", self.cycle);
            self.emit(CycleEvent::CycleStarted { cycle: self.cycle });

            if !self.energize(cancel).await? {
                return Ok(StopReason::Cancelled);
            }
            if !self.hold(self.timing.on_duration, cancel).await {
                return Ok(StopReason::Cancelled);
            }

            self.de_energize().await?;
            if !self.hold(self.timing.off_duration, cancel).await {
                return Ok(StopReason::Cancelled);
            }
            self.completed += 1;
        }
    }

    /// Indicator OFF, reset, master OFF, then every channel configured and
    /// armed. Returns `false` if cancelled during the reset settle.
    async fn initialize(&mut self, cancel: &CancellationToken) -> AppResult<bool> {
        self.output_mut()?.set(LineState::Off)?;

        info!("Resetting instrument...");
        self.supply_mut()?.reset().await?;
        if !interruptible_sleep(self.timing.reset_settle, cancel).await {
            return Ok(false);
        }
        self.supply_mut()?.set_master_output(false).await?;

        for index in 0..self.channels.len() {
            let config = self.channels[index];
            self.supply_mut()?.configure_channel(&config).await?;
            info!(
                "Channel {} configured: {} V, {} A limit",
                config.id, config.voltage, config.current
            );
        }
        Ok(true)
    }

    /// Master ON then indicator ON, settle, read every channel.
    /// Returns `false` if cancelled during the settle.
    async fn energize(&mut self, cancel: &CancellationToken) -> AppResult<bool> {
        info!("Turning ON all outputs");
        self.supply_mut()?.set_master_output(true).await?;
        self.output_mut()?.set(LineState::On)?;
        self.transition(CycleState::Energized);

        if !interruptible_sleep(self.timing.output_settle, cancel).await {
            return Ok(false);
        }

        let ids: Vec<Channel> = self.channels.iter().map(|c| c.id).collect();
        for channel in ids {
            match self.supply_mut()?.measure(channel).await {
                Ok(measurement) => {
                    info!("   Ch{}: {}", channel, measurement);
                    self.emit(CycleEvent::Measured {
                        cycle: self.cycle,
                        channel,
                        measurement,
                    });
                }
                Err(e) if e.is_parse() => {
                    warn!("   Ch{}: unreadable measurement: {}", channel, e);
                    self.emit(CycleEvent::MeasurementFailed {
                        cycle: self.cycle,
                        channel,
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Master OFF then indicator OFF.
    async fn de_energize(&mut self) -> AppResult<()> {
        info!("Turning OFF all outputs");
        self.supply_mut()?.set_master_output(false).await?;
        self.output_mut()?.set(LineState::Off)?;
        self.transition(CycleState::DeEnergized);
        Ok(())
    }

    async fn hold(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        self.emit(CycleEvent::HoldStarted {
            cycle: self.cycle,
            state: self.state,
            duration,
        });
        debug!("Holding {} for {:?}", self.state, duration);
        interruptible_sleep(duration, cancel).await
    }

    /// Best-effort: every step runs even if an earlier one failed.
    async fn shutdown(&mut self) {
        if matches!(
            self.state,
            CycleState::ShuttingDown | CycleState::Terminated
        ) {
            debug!("Shutdown already performed");
            return;
        }
        self.transition(CycleState::ShuttingDown);
        info!("Shutting down: turning OFF all outputs");

        let mut failures = Vec::new();

        let master_off = match self.supply.as_mut() {
            Some(supply) => supply.set_master_output(false).await,
            None => Ok(()),
        };
        if let Err(e) = master_off {
            self.shutdown_step_failed("master output OFF", e, &mut failures);
        }

        let line_off = match self.output.as_mut() {
            Some(output) => output.set(LineState::Off),
            None => Ok(()),
        };
        if let Err(e) = line_off {
            self.shutdown_step_failed("indicator OFF", e, &mut failures);
        }

        self.release_drivers().await;
        self.transition(CycleState::Terminated);

        if failures.is_empty() {
            info!("Outputs OFF, drivers released");
        } else {
            warn!("{}", CyclerError::ShutdownFailed(failures));
        }
    }

    fn shutdown_step_failed(
        &self,
        step: &'static str,
        error: CyclerError,
        failures: &mut Vec<CyclerError>,
    ) {
        warn!("Shutdown step '{}' failed: {}", step, error);
        self.emit(CycleEvent::ShutdownStepFailed {
            step,
            error: error.to_string(),
        });
        failures.push(error);
    }

    async fn release_drivers(&mut self) {
        if let Some(mut supply) = self.supply.take() {
            supply.close().await;
        }
        if let Some(mut output) = self.output.take() {
            output.release();
        }
    }

    fn transition(&mut self, to: CycleState) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(to),
            "illegal transition {} -> {}",
            from,
            to
        );
        self.state = to;
        debug!("State {} -> {}", from, to);
        self.emit(CycleEvent::StateChanged { from, to });
    }

    fn emit(&self, event: CycleEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn supply_mut(&mut self) -> AppResult<&mut PowerSupply<B::Transport>> {
        self.supply
            .as_mut()
            .ok_or_else(|| CyclerError::State("power supply not connected".to_string()))
    }

    fn output_mut(&mut self) -> AppResult<&mut B::Output> {
        self.output
            .as_mut()
            .ok_or_else(|| CyclerError::State("indicator line not open".to_string()))
    }
}

/// Sleep for `duration` unless cancelled first; `true` if the full time elapsed
async fn interruptible_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
