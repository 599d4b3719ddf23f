//! Ramp control and the acquisition loop.
//!
//! - [`ramp`]: the pure setpoint state machine
//! - [`run_engine`]: the per-cycle loop driving the supply
//! - [`state`]: how a run ended

pub mod ramp;
pub mod run_engine;
pub mod state;

pub use ramp::{RampController, RampDecision, RampPhase, RampSpec, RampState};
pub use run_engine::AcquisitionLoop;
pub use state::{FailureStage, RunOutcome, RunReport};
