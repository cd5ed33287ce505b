//! power-cycler binary
//!
//! Exit status: 0 on success or operator stop, 1 on a runtime failure, 2 on
//! a usage or configuration error.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command, ControlArgs, RunArgs};
use power_cycler::adapters::{BenchTrace, MockScpiAdapter, ScpiTransport};
use power_cycler::config::{CyclerConfig, DEFAULT_CONFIG_PATH};
use power_cycler::cycle::{install_interrupt_handler, Bench, HardwareBench, PowerCycler, SimulatedBench};
use power_cycler::instrument::{apply_control, ControlReport, ControlRequest, PowerSupply};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(EXIT_USAGE);
        }
    };

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level)),
        )
        .init();

    let code = match cli.command() {
        Command::Run(args) => run(&config, &args).await,
        Command::Control(args) => match control(&config, &args).await {
            Ok(()) => 0,
            Err(e) => {
                error!("{:#}", e);
                EXIT_FAILURE
            }
        },
    };
    std::process::exit(code);
}

fn load_config(cli: &Cli) -> anyhow::Result<CyclerConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    let mut config: CyclerConfig = CyclerConfig::figment(&path)
        .extract()
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(config: &CyclerConfig, args: &RunArgs) -> i32 {
    info!("=== Power cycler ===");
    info!("Instrument: {}", config.instrument.endpoint);
    info!("Indicator: GPIO{}", config.indicator.line);
    info!(
        "Cycle: ON {:?} / OFF {:?}{}",
        config.cycle.on_duration,
        config.cycle.off_duration,
        config
            .cycle
            .max_cycles
            .map(|n| format!(", {} cycles", n))
            .unwrap_or_default()
    );
    info!("Press Ctrl+C to stop");

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    if args.simulate {
        info!("Simulation mode: no hardware is touched");
        let bench = SimulatedBench::new(BenchTrace::new(), config.indicator.line);
        run_cycler(bench, config, &cancel).await
    } else {
        let bench = HardwareBench::new(config.instrument.clone(), config.indicator.line);
        run_cycler(bench, config, &cancel).await
    }
}

async fn run_cycler<B: Bench>(bench: B, config: &CyclerConfig, cancel: &CancellationToken) -> i32 {
    let mut cycler = PowerCycler::new(bench, config.sorted_channels(), config.timing());
    let outcome = cycler.run(cancel).await;
    match outcome.error() {
        Some(e) => error!(
            "Run failed after {} complete cycles ({}): {}",
            outcome.cycles(),
            e.category(),
            e
        ),
        None => info!("Done after {} complete cycles", outcome.cycles()),
    }
    outcome.exit_code()
}

async fn control(config: &CyclerConfig, args: &ControlArgs) -> anyhow::Result<()> {
    let request = args.to_request(config.instrument.max_channels);

    let report = if args.simulate {
        apply_and_close(MockScpiAdapter::new(BenchTrace::new()), config, &request).await?
    } else {
        info!("Connecting to {}...", config.instrument.endpoint);
        let transport = HardwareBench::new(config.instrument.clone(), config.indicator.line)
            .connect_supply()
            .await?;
        apply_and_close(transport, config, &request).await?
    };

    println!("Connected: {}", report.identity);
    for (channel, measurement) in &report.readings {
        println!("Channel {}: {}", channel, measurement);
    }
    Ok(())
}

async fn apply_and_close<T: ScpiTransport>(
    transport: T,
    config: &CyclerConfig,
    request: &ControlRequest,
) -> anyhow::Result<ControlReport> {
    let mut psu = PowerSupply::new(transport).with_reset_settle(config.cycle.reset_settle);
    let result = apply_control(&mut psu, request).await;
    psu.close().await;
    result.context("control request failed")
}
