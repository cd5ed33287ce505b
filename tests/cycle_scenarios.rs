//! End-to-end power-cycle scenarios against the simulated bench.
//!
//! Holds run on tokio's paused clock, so a 3600 s hold costs nothing.

use power_cycler::adapters::{BenchTrace, MockScpiAdapter, TraceEntry};
use power_cycler::cycle::{
    CycleEvent, CycleOutcome, CycleState, CycleTiming, PowerCycler, SimulatedBench,
};
use power_cycler::hardware::{LineState, MockLine};
use power_cycler::instrument::{Channel, ChannelConfig, Measurement};
use power_cycler::CyclerError;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const LINE: u8 = 17;

fn timing(on: Duration, off: Duration) -> CycleTiming {
    CycleTiming {
        on_duration: on,
        off_duration: off,
        reset_settle: Duration::from_secs(1),
        output_settle: Duration::from_millis(500),
        max_cycles: None,
    }
}

fn two_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig::new(Channel::new(1), 3.3, 0.1),
        ChannelConfig::new(Channel::new(2), 5.1, 0.05),
    ]
}

fn scpi(command: &str) -> TraceEntry {
    TraceEntry::Scpi(command.to_string())
}

fn line(state: LineState) -> TraceEntry {
    TraceEntry::Line { line: LINE, state }
}

fn initialization() -> Vec<TraceEntry> {
    vec![
        scpi("*IDN?"),
        line(LineState::Off),
        scpi("*RST"),
        scpi("OUTPut:GENeral:STATe OFF"),
        scpi("INSTrument:SELect 1"),
        scpi("SOURce:VOLTage:LEVel:IMMediate:AMPlitude 3.3"),
        scpi("SOURce:CURRent:LEVel:IMMediate:AMPlitude 0.1"),
        scpi("OUTPut:SELect ON"),
        scpi("INSTrument:SELect 2"),
        scpi("SOURce:VOLTage:LEVel:IMMediate:AMPlitude 5.1"),
        scpi("SOURce:CURRent:LEVel:IMMediate:AMPlitude 0.05"),
        scpi("OUTPut:SELect ON"),
    ]
}

fn energize() -> Vec<TraceEntry> {
    vec![
        scpi("OUTPut:GENeral:STATe ON"),
        line(LineState::On),
        scpi("INSTrument:SELect 1"),
        scpi("READ?"),
        scpi("INSTrument:SELect 2"),
        scpi("READ?"),
    ]
}

fn de_energize() -> Vec<TraceEntry> {
    vec![scpi("OUTPut:GENeral:STATe OFF"), line(LineState::Off)]
}

fn shutdown() -> Vec<TraceEntry> {
    vec![
        scpi("OUTPut:GENeral:STATe OFF"),
        line(LineState::Off),
        TraceEntry::SessionClosed,
        TraceEntry::LineReleased { line: LINE },
    ]
}

/// Collect every event until the cycler is dropped; cancel once the hold
/// `stop_at` starts.
fn watch(
    mut events: broadcast::Receiver<CycleEvent>,
    cancel: CancellationToken,
    stop_at: Option<(u64, CycleState)>,
) -> JoinHandle<Vec<CycleEvent>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(event) = events.recv().await {
            if let CycleEvent::HoldStarted { cycle, state, .. } = &event {
                if stop_at == Some((*cycle, *state)) {
                    cancel.cancel();
                }
            }
            seen.push(event);
        }
        seen
    })
}

fn last_master_command(trace: &BenchTrace) -> Option<String> {
    trace
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("OUTPut:GENeral:STATe"))
        .last()
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_fourth_on_hold() {
    let trace = BenchTrace::new();
    let bench = SimulatedBench::new(trace.clone(), LINE);
    let mut cycler = PowerCycler::new(
        bench,
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );
    let cancel = CancellationToken::new();
    let watcher = watch(
        cycler.subscribe(),
        cancel.clone(),
        Some((4, CycleState::Energized)),
    );

    let started = Instant::now();
    let outcome = cycler.run(&cancel).await;
    let elapsed = started.elapsed();

    assert!(matches!(outcome, CycleOutcome::Cancelled { cycles: 3 }));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(cycler.state(), CycleState::Terminated);

    let mut expected = initialization();
    for _ in 0..3 {
        expected.extend(energize());
        expected.extend(de_energize());
    }
    expected.extend(energize());
    expected.extend(shutdown());
    assert_eq!(trace.entries(), expected);

    // reset settle + 3 full cycles + the fourth output settle
    assert!(elapsed >= Duration::from_millis(12_000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(12_500), "{:?}", elapsed);

    drop(cycler);
    let events = watcher.await.unwrap();

    let measured: Vec<(u64, Channel, Measurement)> = events
        .iter()
        .filter_map(|e| match e {
            CycleEvent::Measured {
                cycle,
                channel,
                measurement,
            } => Some((*cycle, *channel, *measurement)),
            _ => None,
        })
        .collect();
    assert_eq!(measured.len(), 8);
    assert_eq!(
        measured[0],
        (
            1,
            Channel::new(1),
            Measurement {
                voltage: 3.3,
                current: 0.066
            }
        )
    );
    // 5.1 V into 50 ohm is limited to 50 mA
    assert_eq!(
        measured[1],
        (
            1,
            Channel::new(2),
            Measurement {
                voltage: 5.1,
                current: 0.05
            }
        )
    );

    assert!(events.contains(&CycleEvent::Identified {
        identity: "Rohde&Schwarz,NGP804,000000,1.0 (simulated)".to_string()
    }));
    assert_eq!(
        events.last(),
        Some(&CycleEvent::StateChanged {
            from: CycleState::ShuttingDown,
            to: CycleState::Terminated
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_max_cycles_completes_cleanly() {
    let trace = BenchTrace::new();
    let timing = CycleTiming {
        max_cycles: Some(2),
        ..timing(Duration::from_secs(55), Duration::from_secs(5))
    };
    let mut cycler = PowerCycler::new(SimulatedBench::new(trace.clone(), LINE), two_channels(), timing);
    let cancel = CancellationToken::new();
    let watcher = watch(cycler.subscribe(), cancel.clone(), None);

    let outcome = cycler.run(&cancel).await;
    assert!(matches!(outcome, CycleOutcome::Completed { cycles: 2 }));
    assert!(outcome.is_clean());

    let mut expected = initialization();
    for _ in 0..2 {
        expected.extend(energize());
        expected.extend(de_energize());
    }
    expected.extend(shutdown());
    assert_eq!(trace.entries(), expected);

    drop(cycler);
    let transitions: Vec<(CycleState, CycleState)> = watcher
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            CycleEvent::StateChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    use CycleState::*;
    assert_eq!(
        transitions,
        vec![
            (Uninitialized, Initializing),
            (Initializing, Energized),
            (Energized, DeEnergized),
            (DeEnergized, Energized),
            (Energized, DeEnergized),
            (DeEnergized, ShuttingDown),
            (ShuttingDown, Terminated),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_initialization_failure_turns_everything_off() {
    let trace = BenchTrace::new();
    let adapter =
        MockScpiAdapter::new(trace.clone()).with_failure("SOURce:VOLTage", 2);
    let bench = SimulatedBench::new(trace.clone(), LINE).with_adapter(adapter);
    let mut cycler = PowerCycler::new(
        bench,
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );

    let outcome = cycler.run(&CancellationToken::new()).await;
    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            error: CyclerError::Command { .. },
            cycles: 0
        }
    ));
    assert_eq!(cycler.state(), CycleState::Terminated);

    let commands = trace.commands();
    assert!(!commands.contains(&"OUTPut:GENeral:STATe ON".to_string()));
    assert_eq!(trace.count(&line(LineState::On)), 0);

    let entries = trace.entries();
    assert_eq!(entries[entries.len() - 4..], shutdown()[..]);
    assert_eq!(entries[entries.len() - 5], scpi("INSTrument:SELect 2"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_preempts_long_hold() {
    let trace = BenchTrace::new();
    let mut cycler = PowerCycler::new(
        SimulatedBench::new(trace.clone(), LINE),
        two_channels(),
        timing(Duration::from_secs(3600), Duration::from_secs(3600)),
    );
    let cancel = CancellationToken::new();
    let _watcher = watch(
        cycler.subscribe(),
        cancel.clone(),
        Some((1, CycleState::Energized)),
    );

    let started = Instant::now();
    let outcome = cycler.run(&cancel).await;

    assert!(matches!(outcome, CycleOutcome::Cancelled { cycles: 0 }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(last_master_command(&trace).as_deref(), Some("OUTPut:GENeral:STATe OFF"));
    assert_eq!(trace.entries()[trace.entries().len() - 4..], shutdown()[..]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_interrupts_shut_down_once() {
    let trace = BenchTrace::new();
    let mut cycler = PowerCycler::new(
        SimulatedBench::new(trace.clone(), LINE),
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );
    let cancel = CancellationToken::new();

    let interrupter = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5200)).await;
            cancel.cancel();
            tokio::time::sleep(Duration::from_millis(1)).await;
            cancel.cancel();
        })
    };

    let outcome = cycler.run(&cancel).await;
    interrupter.await.unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(trace.count(&TraceEntry::SessionClosed), 1);
    assert_eq!(trace.count(&TraceEntry::LineReleased { line: LINE }), 1);

    // A second run never touches the hardware again
    let entries = trace.entries().len();
    let again = cycler.run(&cancel).await;
    assert!(matches!(again.error(), Some(CyclerError::State(_))));
    assert_eq!(trace.entries().len(), entries);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_measurement_does_not_stop_cycling() {
    let trace = BenchTrace::new();
    let adapter = MockScpiAdapter::new(trace.clone()).with_response("READ?", "OVERLOAD");
    let timing = CycleTiming {
        max_cycles: Some(2),
        ..timing(Duration::from_secs(2), Duration::from_secs(1))
    };
    let mut cycler = PowerCycler::new(
        SimulatedBench::new(trace.clone(), LINE).with_adapter(adapter),
        two_channels(),
        timing,
    );
    let cancel = CancellationToken::new();
    let watcher = watch(cycler.subscribe(), cancel.clone(), None);

    let outcome = cycler.run(&cancel).await;
    assert!(matches!(outcome, CycleOutcome::Completed { cycles: 2 }));

    drop(cycler);
    let events = watcher.await.unwrap();
    let failed: Vec<&CycleEvent> = events
        .iter()
        .filter(|e| matches!(e, CycleEvent::MeasurementFailed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(matches!(
        failed[0],
        CycleEvent::MeasurementFailed { cycle: 1, channel, .. } if *channel == Channel::new(1)
    ));
    let measured = events
        .iter()
        .filter(|e| matches!(e, CycleEvent::Measured { .. }))
        .count();
    assert_eq!(measured, 3);
}

#[tokio::test(start_paused = true)]
async fn test_measurement_command_failure_is_fatal() {
    let trace = BenchTrace::new();
    let adapter = MockScpiAdapter::new(trace.clone()).with_failure("READ?", 3);
    let mut cycler = PowerCycler::new(
        SimulatedBench::new(trace.clone(), LINE).with_adapter(adapter),
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );

    let outcome = cycler.run(&CancellationToken::new()).await;
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            error: CyclerError::Command { .. },
            cycles: 1
        }
    ));
    assert_eq!(last_master_command(&trace).as_deref(), Some("OUTPut:GENeral:STATe OFF"));
    assert_eq!(trace.entries()[trace.entries().len() - 4..], shutdown()[..]);
}

#[tokio::test(start_paused = true)]
async fn test_indicator_fault_while_energizing() {
    let trace = BenchTrace::new();
    let output = MockLine::new(LINE, trace.clone()).failing_on(LineState::On);
    let mut cycler = PowerCycler::new(
        SimulatedBench::new(trace.clone(), LINE).with_output(output),
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );

    let outcome = cycler.run(&CancellationToken::new()).await;
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            error: CyclerError::Io { line: LINE, .. },
            cycles: 0
        }
    ));

    // Supply went ON, the indicator never did, and shutdown turned the supply back OFF
    let mut expected = initialization();
    expected.push(scpi("OUTPut:GENeral:STATe ON"));
    expected.extend(shutdown());
    assert_eq!(trace.entries(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_indicator_never_opens_supply() {
    let trace = BenchTrace::new();
    let bench = SimulatedBench::new(trace.clone(), LINE).with_unavailable_output("not a Raspberry Pi");
    let mut cycler = PowerCycler::new(
        bench,
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );

    let outcome = cycler.run(&CancellationToken::new()).await;
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            error: CyclerError::Io { .. },
            ..
        }
    ));
    assert_eq!(cycler.state(), CycleState::Terminated);
    assert!(trace.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_supply_releases_indicator() {
    let trace = BenchTrace::new();
    let bench = SimulatedBench::new(trace.clone(), LINE).with_unreachable_supply("no route to host");
    let mut cycler = PowerCycler::new(
        bench,
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );

    let outcome = cycler.run(&CancellationToken::new()).await;
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            error: CyclerError::Connect { .. },
            ..
        }
    ));
    assert_eq!(trace.entries(), vec![TraceEntry::LineReleased { line: LINE }]);
}

#[tokio::test(start_paused = true)]
async fn test_identify_failure_closes_session() {
    let trace = BenchTrace::new();
    let adapter = MockScpiAdapter::new(trace.clone()).with_failure("*IDN?", 1);
    let mut cycler = PowerCycler::new(
        SimulatedBench::new(trace.clone(), LINE).with_adapter(adapter),
        two_channels(),
        timing(Duration::from_secs(2), Duration::from_secs(1)),
    );

    let outcome = cycler.run(&CancellationToken::new()).await;
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(
        trace.entries(),
        vec![
            TraceEntry::SessionClosed,
            TraceEntry::LineReleased { line: LINE }
        ]
    );
}
