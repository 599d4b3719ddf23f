//! Fixed-interval acquisition loop.
//!
//! One cycle, in strict order:
//!
//! ```text
//! ramp.advance() ─> VSET ─> sleep(interval) ─> VOUT?/IOUT? ─> append
//!     ─> [every flush_every: flush + replot] ─> poll keys
//! ```
//!
//! A sample is therefore never taken before its setpoint has been applied and
//! has settled for a full interval. Cancellation is only seen at the end of a
//! cycle; the sleep and bus calls are never interrupted.

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::ramp::{RampController, RampDecision, RampSpec};
use super::state::{FailureStage, RunOutcome, RunReport};
use crate::cancel::CancellationWatch;
use crate::data::{Sample, SampleSink};
use crate::error::{AppResult, RampError};
use crate::hardware::capabilities::{InstrumentLink, KeySource};
use crate::instrument::hp663x::vset_command;
use crate::instrument::SampleReader;
use crate::plot::{PlotMode, PlotRefresher};

/// Drives the supply through one run.
///
/// Without a [`RampSpec`] the loop samples at a constant setpoint and runs until
/// the operator cancels.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use psu_ramp::cancel::CancellationWatch;
/// use psu_ramp::data::Sample;
/// use psu_ramp::experiment::{AcquisitionLoop, RampSpec, RunOutcome};
/// use psu_ramp::hardware::mock::{MockSupply, ScriptedKeys};
/// use psu_ramp::plot::PlotRefresher;
///
/// let mut samples: Vec<Sample> = Vec::new();
/// let report = AcquisitionLoop::new(Duration::ZERO, 100)
///     .run(
///         Some(RampSpec { start_volt: 0.0, end_volt: 1.0, step_mv: 500, dual: false }),
///         &mut MockSupply::new(),
///         &mut samples,
///         &mut PlotRefresher::disabled("unused.dat"),
///         &mut CancellationWatch::new(ScriptedKeys::silent()),
///     )
///     .unwrap();
/// assert_eq!(report.outcome, RunOutcome::Completed);
/// assert_eq!(samples.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct AcquisitionLoop {
    interval: Duration,
    flush_every: u32,
    progress: bool,
    reader: SampleReader,
}

impl AcquisitionLoop {
    /// Loop sampling every `interval`, flushing every `flush_every` samples
    pub fn new(interval: Duration, flush_every: u32) -> Self {
        Self {
            interval,
            flush_every: flush_every.max(1),
            progress: false,
            reader: SampleReader::new(),
        }
    }

    /// Print a carriage-return terminated progress line every cycle
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Run until the ramp ends, the operator cancels, or the instrument fails.
    ///
    /// Instrument failures are reported in the returned [`RunReport`]; an `Err` is
    /// only returned when the sink cannot be written. The sink is flushed before
    /// returning on every path where it is still writable.
    pub fn run<L, S, K>(
        &self,
        ramp: Option<RampSpec>,
        link: &mut L,
        sink: &mut S,
        plot: &mut PlotRefresher,
        cancel: &mut CancellationWatch<K>,
    ) -> AppResult<RunReport>
    where
        L: InstrumentLink + ?Sized,
        S: SampleSink + ?Sized,
        K: KeySource,
    {
        let mut controller = ramp.map(RampController::new);
        let mode = if controller.is_some() {
            PlotMode::Ramp
        } else {
            PlotMode::TimeSeries
        };
        info!(?ramp, interval_ms = self.interval.as_millis() as u64, "Acquisition started");

        let started = Instant::now();
        let mut cycles: u64 = 0;
        let mut segments: u8 = 1;
        let mut failure: Option<RampError> = None;

        let outcome = loop {
            if let Some(ctrl) = controller.as_mut() {
                let decision = match ctrl.advance() {
                    RampDecision::ReverseAndContinue => {
                        if ctrl.state().segment_has_data {
                            sink.mark_segment_boundary()?;
                            segments = 2;
                        }
                        info!(setpoint = ctrl.setpoint(), "Ramp reversed");
                        ctrl.advance()
                    }
                    other => other,
                };
                match decision {
                    RampDecision::ApplySetpoint(volt) => {
                        if let Err(e) = link.send(&vset_command(volt)) {
                            failure = Some(e);
                            break RunOutcome::InstrumentFailure(FailureStage::SetVoltage);
                        }
                    }
                    RampDecision::ReverseAndContinue | RampDecision::Terminate => {
                        break RunOutcome::Completed;
                    }
                }
            }

            thread::sleep(self.interval);

            let elapsed_minutes = started.elapsed().as_secs_f64() / 60.0;
            let reading = match self.reader.read(link) {
                Ok(reading) => reading,
                Err(e) => {
                    let stage = FailureStage::of_read_error(&e);
                    failure = Some(e);
                    break RunOutcome::InstrumentFailure(stage);
                }
            };

            cycles += 1;
            let sample = Sample {
                elapsed_minutes,
                volt: reading.volt,
                amp: reading.amp,
            };
            sink.append(sample)?;
            if let Some(ctrl) = controller.as_mut() {
                ctrl.note_sample();
            }
            debug!(cycle = cycles, elapsed_minutes, volt = sample.volt, amp = sample.amp, "Sample");
            if self.progress {
                print_progress(cycles, &sample);
            }

            if cycles % u64::from(self.flush_every) == 0 {
                sink.flush()?;
                plot.refresh(mode, segments > 1);
            }

            if cancel.poll() {
                break RunOutcome::Cancelled;
            }
        };

        sink.flush()?;

        match &failure {
            Some(e) => error!(%outcome, error = %e, cycles, "Acquisition aborted"),
            None => info!(%outcome, cycles, "Acquisition finished"),
        }

        Ok(RunReport {
            outcome,
            cycles,
            segments,
            failure,
        })
    }
}

fn print_progress(cycle: u64, sample: &Sample) {
    let mut stdout = io::stdout().lock();
    // Progress output is best effort
    let _ = write!(
        stdout,
        "{:10} {:10.2} min {:10.4} V {:10.4} A\r",
        cycle, sample.elapsed_minutes, sample.volt, sample.amp
    );
    let _ = stdout.flush();
}
