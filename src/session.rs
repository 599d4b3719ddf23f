//! Run orchestration.
//!
//! A session wires the configured collaborators together in a fixed order:
//!
//! 1. open the dataset file (hard requirement)
//! 2. start plotting (soft; failure is logged and the run continues)
//! 3. open the instrument, resetting it when requested, and apply the setup
//! 4. configure-only runs stop here; otherwise run the acquisition loop
//! 5. close the dataset, release the instrument, final replot, close the plot
//!
//! The instrument is held by an [`InstrumentGuard`], so it is reset on every exit
//! path, including early returns and panics.

use std::fmt::Write as _;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};

use crate::cancel::CancellationWatch;
use crate::config::RampConfig;
use crate::data::{DatasetHeader, DatasetWriter};
use crate::error::AppResult;
use crate::experiment::{AcquisitionLoop, RunReport};
use crate::hardware::capabilities::{InstrumentLink, KeySource, PlotSink};
use crate::instrument::hp663x::{Hp663x, SupplySettings, RESET_SETTLE};
use crate::plot::{PlotMode, PlotRefresher};

/// Poll period while waiting for the key that closes the plot
const KEY_WAIT_POLL: Duration = Duration::from_millis(100);

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Settings were applied and the session ended without acquiring
    ConfiguredOnly,
    /// The acquisition loop ran; see the report for how it ended
    Finished(RunReport),
}

/// Owns the supply driver for the duration of a run.
///
/// Call [`InstrumentGuard::release`] on the normal path. If the guard is dropped
/// without being released, the supply is reset on a best-effort basis when a reset
/// was requested.
pub struct InstrumentGuard<L: InstrumentLink> {
    psu: Hp663x<L>,
    reset_on_exit: bool,
    released: bool,
}

impl<L: InstrumentLink> InstrumentGuard<L> {
    /// Take ownership of an opened driver
    pub fn new(psu: Hp663x<L>, reset_on_exit: bool) -> Self {
        Self {
            psu,
            reset_on_exit,
            released: false,
        }
    }

    /// Borrow the driver
    pub fn psu_mut(&mut self) -> &mut Hp663x<L> {
        &mut self.psu
    }

    /// End the run, resetting the supply when requested
    pub fn release(mut self) -> AppResult<()> {
        self.released = true;
        self.psu.close(self.reset_on_exit)
    }
}

impl<L: InstrumentLink> Drop for InstrumentGuard<L> {
    fn drop(&mut self) {
        if self.released || !self.reset_on_exit {
            return;
        }
        warn!("Run aborted, resetting power supply");
        if let Err(e) = self.psu.close(true) {
            warn!(error = %e, "Reset on abort failed");
        }
    }
}

/// Operator-facing summary printed before acquisition starts
pub fn run_summary(config: &RampConfig) -> String {
    let mut out = String::new();
    let path = config
        .output
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let _ = write!(out, "\n GPIB address :  {}", config.instrument.address);
    let _ = write!(out, "\n  Output file :  {path}");
    if !config.output.comment.is_empty() {
        let _ = write!(out, "\n      Comment :  {}", config.output.comment);
    }
    let _ = write!(out, "\nVoltage limit :  {:.4} V", config.voltage_limit());
    let _ = write!(
        out,
        "\nCurrent {:>5} :  {:.4} A",
        if config.supply.overcurrent_trip { "trip" } else { "limit" },
        config.current_limit()
    );
    let _ = write!(
        out,
        "\n     Sampling :  {:.1} s",
        f64::from(config.acquisition.interval_ds) / 10.0
    );
    if config.is_ramp() {
        let _ = write!(out, "\n   Ramp start :  {:.4} V", config.supply.voltage);
        let _ = write!(out, "\n     Ramp end :  {:.4} V", config.ramp.upper_voltage);
        let _ = write!(out, "\n    Increment :  {} mV", config.ramp.step_mv);
    }
    let _ = write!(out, "\n      Refresh :  {}", config.acquisition.flush_every);
    out.push_str("\n         Stop :  Press 'q' or ESC.\n");
    out.push_str("\n     Count           Time      Reading\n");
    out
}

/// One configured run
pub struct Session<'a> {
    config: &'a RampConfig,
    reset_settle: Duration,
    quiet: bool,
}

impl<'a> Session<'a> {
    /// Session for a validated configuration
    pub fn new(config: &'a RampConfig) -> Self {
        Self {
            config,
            reset_settle: RESET_SETTLE,
            quiet: false,
        }
    }

    /// Override the pause after resetting the supply
    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    /// Suppress the summary and prompts on stdout
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Operating point for the initial setup
    ///
    /// An upward ramp starts from 0 V; otherwise the configured voltage is applied.
    pub fn setup_settings(&self) -> SupplySettings {
        let volt = if self.config.ramp.step_mv > 0 {
            0.0
        } else {
            self.config.supply.voltage
        };
        SupplySettings {
            volt,
            amp: self.config.current_limit(),
            volt_limit: self.config.voltage_limit(),
            overcurrent_trip: self.config.supply.overcurrent_trip,
        }
    }

    /// Run the session.
    ///
    /// `open_link` and `open_plot` are called at their place in the startup order.
    /// Instrument failures inside the loop are reported through the returned
    /// [`RunReport`]; failures before the loop, dataset errors and a failed final
    /// reset are returned as errors.
    pub fn run<L, F, P, K>(&self, open_link: F, open_plot: P, keys: K) -> AppResult<SessionOutcome>
    where
        L: InstrumentLink,
        F: FnOnce() -> AppResult<L>,
        P: FnOnce() -> AppResult<Box<dyn PlotSink>>,
        K: KeySource,
    {
        let config = self.config;
        let configure_only = config.is_configure_only();
        let path = config.output.path.clone().unwrap_or_default();

        let mut dataset = if configure_only {
            None
        } else {
            Some(DatasetWriter::open(&path)?)
        };

        let mut plot = self.start_plot(&path, open_plot);

        let link = open_link()?;
        let reset = config.reset_on_exit();
        let mut guard = InstrumentGuard::new(
            Hp663x::new(link).with_reset_settle(self.reset_settle),
            reset,
        );
        guard.psu_mut().open(reset)?;
        guard.psu_mut().setup(&self.setup_settings())?;

        let Some(dataset) = dataset.as_mut() else {
            info!("Interval is zero, settings applied without acquisition");
            guard.release()?;
            return Ok(SessionOutcome::ConfiguredOnly);
        };

        if !self.quiet {
            println!("{}", run_summary(config));
        }

        dataset.write_header(&DatasetHeader::new(
            format!("{} {}", config.application.name, env!("CARGO_PKG_VERSION")),
            config.output.comment.clone(),
        ))?;

        let mut cancel = CancellationWatch::new(keys);
        let report = AcquisitionLoop::new(config.interval(), config.acquisition.flush_every)
            .with_progress(config.acquisition.progress && !self.quiet)
            .run(
                config.ramp_spec(),
                guard.psu_mut().link_mut(),
                dataset,
                &mut plot,
                &mut cancel,
            )?;

        dataset.close(Local::now())?;
        match guard.release() {
            // The run report carries the first failure; keep it
            Err(e) if !report.outcome.is_success() => {
                warn!(error = %e, "Reset after instrument failure failed");
            }
            other => other?,
        }

        let mode = if config.is_ramp() {
            PlotMode::Ramp
        } else {
            PlotMode::TimeSeries
        };
        if report.outcome.is_success()
            && plot.refresh(mode, report.has_second_segment())
            && config.plot.wait_for_key
        {
            if !self.quiet {
                println!("\nAcquisition finished. Press any key to terminate graphic display and exit.");
            }
            wait_for_any_key(cancel.keys_mut());
        }
        plot.close();

        Ok(SessionOutcome::Finished(report))
    }

    fn start_plot<P>(&self, path: &Path, open_plot: P) -> PlotRefresher
    where
        P: FnOnce() -> AppResult<Box<dyn PlotSink>>,
    {
        if !self.config.plotting_enabled() {
            return PlotRefresher::disabled(path.to_path_buf());
        }
        match open_plot() {
            Ok(sink) => PlotRefresher::new(sink, path.to_path_buf()),
            Err(e) => {
                warn!(error = %e, "Cannot launch gnuplot, will continue \"as is\"");
                PlotRefresher::disabled(path.to_path_buf())
            }
        }
    }
}

fn wait_for_any_key<K: KeySource>(keys: &mut K) {
    // Discard the rest of the line that ended the run
    while keys.poll_nonblocking().is_some() {}
    while keys.poll_nonblocking().is_none() {
        thread::sleep(KEY_WAIT_POLL);
    }
}
