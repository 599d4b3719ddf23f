//! Live plotting through gnuplot.
//!
//! The plotting process holds no state we rely on: every refresh sends the full
//! script (display settings plus one `plot` line) and gnuplot rereads the dataset
//! file. Plotting is optional; once a refresh fails the run continues without it.

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{AppResult, RampError};
use crate::hardware::capabilities::PlotSink;

/// What the plot shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotMode {
    /// Current against voltage, one series per segment
    Ramp,
    /// Voltage and current against elapsed minutes, on two y axes
    TimeSeries,
}

/// Build the complete plot script for `path`.
///
/// Pure: identical arguments always give identical text.
pub fn render(mode: PlotMode, path: &Path, has_second_segment: bool) -> String {
    let path = path.display();
    let mut script = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(
        script,
        "set mouse;set mouse labels; set style data lines; set title '{path}'"
    );
    script.push_str("set grid xt; set grid yt\n");
    match mode {
        PlotMode::Ramp => {
            script.push_str("set xlabel 'V'; set ylabel 'A'\n");
            if has_second_segment {
                let _ = writeln!(
                    script,
                    "plot '{path}' using 2:3 index 0 ti 'I vs. U (1)', '' u 2:3 index 1 ti 'I vs. U (2)'"
                );
            } else {
                let _ = writeln!(script, "plot '{path}' using 2:3 ti 'I vs. U (1)'");
            }
        }
        PlotMode::TimeSeries => {
            script.push_str("set xlabel 'min'; set ylabel 'V'; set y2label 'A'; set y2tics\n");
            let _ = writeln!(
                script,
                "plot '{path}' using 1:2 title 'Voltage', '' u 1:3 axis x1y2 title 'Current'"
            );
        }
    }
    script
}

/// Dispatches rendered scripts to an optional [`PlotSink`].
///
/// The first failed dispatch disables plotting for the rest of the run.
pub struct PlotRefresher {
    sink: Option<Box<dyn PlotSink>>,
    path: PathBuf,
    refreshes: u64,
}

impl PlotRefresher {
    /// Plot `path` through `sink`
    pub fn new(sink: Box<dyn PlotSink>, path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Some(sink),
            path: path.into(),
            refreshes: 0,
        }
    }

    /// A refresher that never plots
    pub fn disabled(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: None,
            path: path.into(),
            refreshes: 0,
        }
    }

    /// Whether plotting is still enabled
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Successful dispatches so far
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// Redraw the plot; returns whether the script was handed over
    pub fn refresh(&mut self, mode: PlotMode, has_second_segment: bool) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        let script = render(mode, &self.path, has_second_segment);
        match sink.apply(&script) {
            Ok(()) => {
                self.refreshes += 1;
                debug!(?mode, has_second_segment, "Plot refreshed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Plotting failed, continuing without live plot");
                self.sink = None;
                false
            }
        }
    }

    /// Drop the sink, closing the plot window
    pub fn close(&mut self) {
        if self.sink.take().is_some() {
            debug!("Plot closed");
        }
    }
}

/// A gnuplot process fed through its standard input
pub struct GnuplotPipe {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl GnuplotPipe {
    /// Launch `program` with a piped stdin
    pub fn spawn(program: &str) -> AppResult<Self> {
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| RampError::PlottingUnavailable(format!("cannot launch {program}: {e}")))?;
        let stdin = child.stdin.take();
        info!(program, pid = child.id(), "Started gnuplot");
        Ok(Self { child, stdin })
    }
}

impl PlotSink for GnuplotPipe {
    fn apply(&mut self, script: &str) -> AppResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RampError::PlottingUnavailable("gnuplot stdin closed".to_string()))?;
        stdin
            .write_all(script.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| RampError::PlottingUnavailable(e.to_string()))
    }
}

impl Drop for GnuplotPipe {
    fn drop(&mut self) {
        // Closing stdin makes gnuplot exit
        drop(self.stdin.take());
        match self.child.wait() {
            Ok(status) => debug!(%status, "gnuplot exited"),
            Err(e) => warn!(error = %e, "Error waiting for gnuplot to exit"),
        }
    }
}
