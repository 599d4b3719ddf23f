//! CLI Entry Point for psu-ramp
//!
//! Sets an HP663x power supply, optionally ramps its voltage, and logs the
//! measured voltage and current to a tab-separated file while gnuplot shows
//! the data live.
//!
//! # Usage
//!
//! Ramp from 0 to 10 V in 100 mV steps every 2 s, then back down:
//! ```bash
//! psu-ramp -u 0 -U 10 -r 100 -R -t 20 -c "cell 7" cell7.dat
//! ```
//!
//! Apply 5 V / 0.5 A and exit without logging:
//! ```bash
//! psu-ramp -u 5 -i 0.5 -t 0
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning                           |
//! |------|-----------------------------------|
//! | 0    | finished or cancelled by operator |
//! | 1    | usage or configuration error      |
//! | 4    | dataset file error                |
//! | 5    | instrument error                  |

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use psu_ramp::adapters;
use psu_ramp::cancel::StdinKeys;
use psu_ramp::config::{RampConfig, TransportKind};
use psu_ramp::error::RampError;
use psu_ramp::experiment::RunOutcome;
use psu_ramp::hardware::PlotSink;
use psu_ramp::instrument::SupplyModel;
use psu_ramp::logging;
use psu_ramp::plot::GnuplotPipe;
use psu_ramp::session::{Session, SessionOutcome};
use tracing::{error, info};

const EXIT_USAGE: u8 = 1;
const EXIT_FILE: u8 = 4;
const EXIT_INSTRUMENT: u8 = 5;

#[derive(Parser, Debug)]
#[command(name = "psu-ramp", version)]
#[command(about = "Voltage ramp and data acquisition for HP663x power supplies", long_about = None)]
struct Cli {
    /// GPIB primary address (0...30)
    #[arg(short = 'a', long)]
    address: Option<u8>,

    /// Output voltage in V; ramp lower bound when ramping
    #[arg(short = 'u', long)]
    voltage: Option<f64>,

    /// Upper ramp voltage in V
    #[arg(short = 'U', long)]
    upper: Option<f64>,

    /// Overvoltage limit in V
    #[arg(short = 'M', long)]
    volt_limit: Option<f64>,

    /// Current limit in A
    #[arg(short = 'i', long)]
    current: Option<f64>,

    /// Trip the output on overcurrent instead of limiting
    #[arg(short = 'I', long)]
    trip: bool,

    /// Ramp increment in mV (+/-1...1000); negative ramps down from -U to -u
    #[arg(short = 'r', long, allow_negative_numbers = true)]
    ramp: Option<i32>,

    /// Dual ramp: run back to the start after reaching the end
    #[arg(short = 'R', long)]
    dual: bool,

    /// Sampling interval in 1/10 s (0 applies the settings and exits)
    #[arg(short = 't', long)]
    interval: Option<u32>,

    /// Keep the supply's settings at the end instead of resetting it
    #[arg(short = 'k', long)]
    keep: bool,

    /// Do not wait for a key before closing the plot
    #[arg(short = 'K', long)]
    no_wait: bool,

    /// Flush the file and refresh the plot every n samples
    #[arg(short = 'w', long)]
    flush_every: Option<u32>,

    /// Overwrite an existing output file without asking
    #[arg(short = 'f', long)]
    force: bool,

    /// Comment written into the file header
    #[arg(short = 'c', long)]
    comment: Option<String>,

    /// gnuplot executable
    #[arg(short = 'g', long)]
    gnuplot: Option<String>,

    /// Disable the live plot
    #[arg(short = 'n', long)]
    no_plot: bool,

    /// Output data file
    outfile: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instrument transport: prologix, visa or mock
    #[arg(long, value_parser = parse_transport)]
    transport: Option<TransportKind>,

    /// Supply model: hp6632, hp6633 or hp6634
    #[arg(long, value_parser = parse_model)]
    model: Option<SupplyModel>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_transport(value: &str) -> Result<TransportKind, String> {
    match value.to_lowercase().as_str() {
        "prologix" => Ok(TransportKind::Prologix),
        "visa" => Ok(TransportKind::Visa),
        "mock" => Ok(TransportKind::Mock),
        other => Err(format!("unknown transport '{other}'")),
    }
}

fn parse_model(value: &str) -> Result<SupplyModel, String> {
    match value.to_lowercase().trim_end_matches('a') {
        "hp6632" => Ok(SupplyModel::Hp6632),
        "hp6633" => Ok(SupplyModel::Hp6633),
        "hp6634" => Ok(SupplyModel::Hp6634),
        other => Err(format!("unknown supply model '{other}'")),
    }
}

impl Cli {
    /// Apply command line flags on top of the loaded configuration
    fn apply_to(&self, config: &mut RampConfig) {
        if let Some(address) = self.address {
            config.instrument.address = address;
        }
        if let Some(transport) = self.transport {
            config.instrument.transport = transport;
        }
        if let Some(model) = self.model {
            config.instrument.model = model;
        }
        if self.keep {
            config.instrument.reset = false;
        }
        if let Some(voltage) = self.voltage {
            config.supply.voltage = voltage;
        }
        if let Some(limit) = self.volt_limit {
            config.supply.voltage_limit = Some(limit);
        }
        if let Some(current) = self.current {
            config.supply.current_limit = Some(current);
        }
        if self.trip {
            config.supply.overcurrent_trip = true;
        }
        if let Some(upper) = self.upper {
            config.ramp.upper_voltage = upper;
        }
        if let Some(step) = self.ramp {
            config.ramp.step_mv = step;
        }
        if self.dual {
            config.ramp.dual = true;
        }
        if let Some(interval) = self.interval {
            config.acquisition.interval_ds = interval;
        }
        if let Some(flush_every) = self.flush_every {
            config.acquisition.flush_every = flush_every;
        }
        if let Some(path) = &self.outfile {
            config.output.path = Some(path.clone());
        }
        if let Some(comment) = &self.comment {
            config.output.comment = comment.clone();
        }
        if self.force {
            config.output.overwrite = true;
        }
        if let Some(gnuplot) = &self.gnuplot {
            config.plot.gnuplot = gnuplot.clone();
        }
        if self.no_plot {
            config.plot.enabled = false;
        }
        if self.no_wait {
            config.plot.wait_for_key = false;
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!("Quit.");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<RampError>() {
        Some(RampError::Dataset(_)) => EXIT_FILE,
        Some(e) if e.is_instrument_failure() => EXIT_INSTRUMENT,
        _ => EXIT_USAGE,
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = RampConfig::load_from(cli.config.as_ref())?;
    cli.apply_to(&mut config);
    config.validate()?;

    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;
    info!(
        transport = ?config.instrument.transport,
        model = %config.instrument.model,
        address = config.instrument.address,
        "psu-ramp starting"
    );

    if !config.is_configure_only() && !confirm_overwrite(&config)? {
        return Ok(ExitCode::from(EXIT_USAGE));
    }

    let gnuplot = config.plot.gnuplot.clone();
    let outcome = Session::new(&config).run(
        || adapters::connect(&config.instrument),
        || GnuplotPipe::spawn(&gnuplot).map(|pipe| Box::new(pipe) as Box<dyn PlotSink>),
        StdinKeys::spawn(),
    )?;

    match outcome {
        SessionOutcome::ConfiguredOnly => {
            println!("Settings applied.");
            Ok(ExitCode::SUCCESS)
        }
        SessionOutcome::Finished(report) => {
            println!();
            match (report.outcome, &report.failure) {
                (RunOutcome::InstrumentFailure(stage), failure) => {
                    let reason = failure
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    error!(%stage, %reason, "Run aborted by instrument failure");
                    eprintln!("Instrument failure ({stage}): {reason}");
                    eprintln!("Quit.");
                    Ok(ExitCode::from(EXIT_INSTRUMENT))
                }
                (outcome, _) => {
                    info!(%outcome, samples = report.cycles, "Run finished");
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
    }
}

/// Ask before replacing an existing output file
fn confirm_overwrite(config: &RampConfig) -> Result<bool> {
    let Some(path) = config.output.path.as_ref() else {
        return Ok(true);
    };
    if config.output.overwrite || !path.exists() {
        return Ok(true);
    }

    eprint!("\x07\nFile '{}' exists - Overwrite? [Y/*] ", path.display());
    io::stderr().flush().context("Failed to write prompt")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim_start().chars().next(), Some('y' | 'Y')))
}
