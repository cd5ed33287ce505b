//! Command-line interface

use clap::{Args, Parser, Subcommand};
use humantime_serde::re::humantime::parse_duration;
use power_cycler::config::CyclerConfig;
use power_cycler::instrument::{Channel, ChannelRequest, ControlRequest};
use std::path::PathBuf;
use std::time::Duration;

/// Periodically power-cycle a SCPI bench supply with a GPIO indicator
#[derive(Parser, Debug)]
#[command(name = "power-cycler")]
#[command(version, about)]
pub struct Cli {
    /// Configuration file (default: config/power_cycler.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Instrument endpoint, e.g. 192.168.0.10 or TCPIP0::192.168.0.10::inst0::INSTR
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// GPIO (BCM) line driving the indicator
    #[arg(long, global = true)]
    pub line: Option<u8>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Cycle the outputs ON and OFF until interrupted
    Run(RunArgs),
    /// Apply one-shot settings to the supply and exit
    Control(ControlArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Time to hold outputs ON, e.g. 55s
    #[arg(long, value_parser = parse_duration)]
    pub on: Option<Duration>,

    /// Time to hold outputs OFF, e.g. 5s
    #[arg(long, value_parser = parse_duration)]
    pub off: Option<Duration>,

    /// Stop after this many complete cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Use a simulated supply and indicator
    #[arg(long)]
    pub simulate: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ControlArgs {
    /// Reset the instrument (*RST)
    #[arg(long)]
    pub reset: bool,

    /// Turn the master switch ON
    #[arg(long, conflicts_with = "all_off")]
    pub all_on: bool,

    /// Turn the master switch OFF
    #[arg(long)]
    pub all_off: bool,

    /// Channel to configure
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..))]
    pub channel: Option<u8>,

    /// Target voltage (V) for --channel
    #[arg(long, requires = "channel")]
    pub voltage: Option<f64>,

    /// Current limit (A) for --channel
    #[arg(long, requires = "channel")]
    pub current: Option<f64>,

    /// Arm --channel and turn the master switch ON
    #[arg(long, requires = "channel", conflicts_with = "off")]
    pub on: bool,

    /// Disarm --channel
    #[arg(long, requires = "channel")]
    pub off: bool,

    /// Print voltage and current of every channel
    #[arg(long)]
    pub status: bool,

    /// Use a simulated supply
    #[arg(long)]
    pub simulate: bool,
}

impl Cli {
    pub fn command(&self) -> Command {
        match &self.command {
            Some(command) => command.clone(),
            None => Command::Run(RunArgs::default()),
        }
    }

    /// Apply flag overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut CyclerConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.instrument.endpoint = endpoint.clone();
        }
        if let Some(line) = self.line {
            config.indicator.line = line;
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }
        if let Some(Command::Run(args)) = &self.command {
            if let Some(on) = args.on {
                config.cycle.on_duration = on;
            }
            if let Some(off) = args.off {
                config.cycle.off_duration = off;
            }
            if args.max_cycles.is_some() {
                config.cycle.max_cycles = args.max_cycles;
            }
        }
    }
}

impl ControlArgs {
    pub fn to_request(&self, max_channels: u8) -> ControlRequest {
        let master = match (self.all_on, self.all_off) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        let output = match (self.on, self.off) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        let status = if self.status {
            (1..=max_channels).map(Channel::new).collect()
        } else {
            Vec::new()
        };

        ControlRequest {
            reset: self.reset,
            master,
            channel: self.channel.map(|channel| ChannelRequest {
                channel: Channel::new(channel),
                voltage: self.voltage,
                current: self.current,
                output,
            }),
            status,
        }
    }
}
