//! Linear voltage ramp state machine.
//!
//! A ramp steps the setpoint from `start_volt` towards `end_volt` in fixed
//! millivolt increments. The step is applied first and the bound is checked on the
//! stepped value, so a step that would overshoot the bound is never applied.
//!
//! # State Machine
//!
//! ```text
//! Outbound ──bound, dual──> Returning ──bound──> Done
//!     │                                           ▲
//!     └──────────────bound, single────────────────┘
//! ```
//!
//! The returning leg runs back towards `start_volt` with the step negated. `Done` is
//! terminal.

use std::fmt;

/// Immutable ramp parameters for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampSpec {
    /// First bound; the outbound leg starts here
    pub start_volt: f64,
    /// Outbound bound; below `start_volt` for a downward ramp
    pub end_volt: f64,
    /// Signed step in millivolts, sign gives the outbound direction
    pub step_mv: i32,
    /// Run back to `start_volt` after reaching `end_volt`
    pub dual: bool,
}

/// Ramp progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    /// Stepping from start towards end
    Outbound,
    /// Stepping from end back towards start (dual ramps only)
    Returning,
    /// Terminal
    Done,
}

impl fmt::Display for RampPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampPhase::Outbound => write!(f, "Outbound"),
            RampPhase::Returning => write!(f, "Returning"),
            RampPhase::Done => write!(f, "Done"),
        }
    }
}

/// What the acquisition loop must do this cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampDecision {
    /// Program this voltage, then sample
    ApplySetpoint(f64),
    /// The outbound bound was reached on a dual ramp; start a new segment
    ReverseAndContinue,
    /// The ramp is over
    Terminate,
}

/// Mutable ramp state, owned by exactly one [`RampController`]
#[derive(Debug, Clone, PartialEq)]
pub struct RampState {
    /// Setpoint offset from `start_volt` in millivolts
    offset_mv: i64,
    /// Current signed step; flips at most once
    pub step_mv: i32,
    /// Which leg the ramp is on
    pub phase: RampPhase,
    /// Whether the outbound segment has produced samples
    pub segment_has_data: bool,
    dual_consumed: bool,
}

/// Decides the setpoint of every cycle.
///
/// Pure state machine: no I/O, cannot fail.
///
/// # Example
///
/// ```rust
/// use psu_ramp::experiment::ramp::{RampController, RampDecision, RampSpec};
///
/// let mut ramp = RampController::new(RampSpec {
///     start_volt: 0.0,
///     end_volt: 2.0,
///     step_mv: 1000,
///     dual: false,
/// });
/// assert_eq!(ramp.advance(), RampDecision::ApplySetpoint(1.0));
/// assert_eq!(ramp.advance(), RampDecision::ApplySetpoint(2.0));
/// assert_eq!(ramp.advance(), RampDecision::Terminate);
/// ```
#[derive(Debug, Clone)]
pub struct RampController {
    spec: RampSpec,
    state: RampState,
}

impl RampController {
    /// Start an outbound ramp at `spec.start_volt`
    pub fn new(spec: RampSpec) -> Self {
        Self {
            spec,
            state: RampState {
                offset_mv: 0,
                step_mv: spec.step_mv,
                phase: RampPhase::Outbound,
                segment_has_data: false,
                dual_consumed: false,
            },
        }
    }

    /// Current state, for inspection
    pub fn state(&self) -> &RampState {
        &self.state
    }

    /// Current phase
    pub fn phase(&self) -> RampPhase {
        self.state.phase
    }

    /// Currently commanded voltage
    pub fn setpoint(&self) -> f64 {
        self.volt_at(self.state.offset_mv)
    }

    /// True once a dual ramp has turned around
    pub fn has_second_segment(&self) -> bool {
        self.state.dual_consumed
    }

    /// Record that a sample was taken in the current segment
    pub fn note_sample(&mut self) {
        if self.state.phase == RampPhase::Outbound {
            self.state.segment_has_data = true;
        }
    }

    fn volt_at(&self, offset_mv: i64) -> f64 {
        self.spec.start_volt + offset_mv as f64 / 1000.0
    }

    /// Bound of the current leg
    fn target(&self) -> f64 {
        match self.state.phase {
            RampPhase::Returning => self.spec.start_volt,
            _ => self.spec.end_volt,
        }
    }

    /// Step the ramp once
    pub fn advance(&mut self) -> RampDecision {
        if self.state.phase == RampPhase::Done {
            return RampDecision::Terminate;
        }

        let next_offset = self.state.offset_mv + i64::from(self.state.step_mv);
        let next = self.volt_at(next_offset);
        let target = self.target();
        let bound_reached = if self.state.step_mv > 0 {
            next > target
        } else {
            next < target
        };

        if !bound_reached {
            self.state.offset_mv = next_offset;
            return RampDecision::ApplySetpoint(next);
        }

        if self.spec.dual && !self.state.dual_consumed {
            self.state.step_mv = -self.state.step_mv;
            self.state.phase = RampPhase::Returning;
            self.state.dual_consumed = true;
            return RampDecision::ReverseAndContinue;
        }

        self.state.phase = RampPhase::Done;
        RampDecision::Terminate
    }
}
