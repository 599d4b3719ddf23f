//! Run outcome reporting.

use serde::Serialize;

use crate::error::RampError;

/// Where in the cycle an instrument failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureStage {
    /// Programming the next setpoint
    SetVoltage,
    /// Querying `VOUT?` / `IOUT?`
    Read,
    /// The device answered with something that is not a number
    Parse,
}

impl FailureStage {
    /// Classify a read error
    pub fn of_read_error(error: &RampError) -> Self {
        match error {
            RampError::MalformedReading { .. } => FailureStage::Parse,
            _ => FailureStage::Read,
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::SetVoltage => write!(f, "set voltage"),
            FailureStage::Read => write!(f, "read"),
            FailureStage::Parse => write!(f, "parse"),
        }
    }
}

/// How the acquisition loop ended
///
/// ```text
/// Running ──ramp bound──> Completed
///    │
///    ├──'q' / ESC──────> Cancelled
///    │
///    └──bus error──────> InstrumentFailure(stage)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// The ramp reached its last bound
    Completed,
    /// The operator pressed a quit key
    Cancelled,
    /// A bus call failed; the run stopped at this stage
    InstrumentFailure(FailureStage),
}

impl RunOutcome {
    /// True unless the instrument failed
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::InstrumentFailure(_))
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "Completed"),
            RunOutcome::Cancelled => write!(f, "Cancelled"),
            RunOutcome::InstrumentFailure(stage) => {
                write!(f, "Instrument failure ({stage})")
            }
        }
    }
}

/// Summary of one acquisition run
#[derive(Debug)]
pub struct RunReport {
    /// How the loop ended
    pub outcome: RunOutcome,
    /// Samples taken
    pub cycles: u64,
    /// Dataset segments written (1, or 2 after a dual ramp turned around)
    pub segments: u8,
    /// The error behind an `InstrumentFailure` outcome
    pub failure: Option<RampError>,
}

impl RunReport {
    /// Whether the dataset holds a returning segment
    pub fn has_second_segment(&self) -> bool {
        self.segments > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_classification() {
        let malformed = RampError::MalformedReading {
            command: "VOUT?".into(),
            response: "??".into(),
        };
        assert_eq!(FailureStage::of_read_error(&malformed), FailureStage::Parse);
        let failed = RampError::query_failed("IOUT?", "timeout");
        assert_eq!(FailureStage::of_read_error(&failed), FailureStage::Read);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RunOutcome::Cancelled.to_string(), "Cancelled");
        assert_eq!(
            RunOutcome::InstrumentFailure(FailureStage::SetVoltage).to_string(),
            "Instrument failure (set voltage)"
        );
        assert!(!RunOutcome::InstrumentFailure(FailureStage::Read).is_success());
    }
}
