//! Custom error types for the application.
//!
//! This module defines the primary error type, `RampError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur while driving a power supply, from bus problems to a
//! dataset file that cannot be written.
//!
//! ## Error Hierarchy
//!
//! Instrument-facing failures are all fatal to a run:
//!
//! - **`TransportUnavailable`**: The bus controller or the addressed device could not be opened.
//! - **`SetupRejected`**: The reset or the combined setup command could not be delivered.
//! - **`SendFailed`** / **`QueryFailed`**: A single command or query failed on the bus.
//! - **`MalformedReading`**: The device answered, but the answer is not a number.
//!
//! `PlottingUnavailable` is the only recoverable class: the run continues without
//! live plots. The remaining variants cover the ambient concerns (dataset file I/O,
//! configuration loading and validation, transports compiled out of the binary).

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, RampError>;

/// Every failure the crate reports
#[derive(Error, Debug)]
pub enum RampError {
    /// The bus or the addressed device could not be opened
    #[error("Instrument transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Reset or operating-mode setting not delivered
    #[error("Instrument rejected setup: {0}")]
    SetupRejected(String),

    /// A command failed on the bus
    #[error("Error executing '{command}': {reason}")]
    SendFailed {
        /// Command as sent, without terminator
        command: String,
        /// Transport error text
        reason: String,
    },

    /// A query failed on the bus
    #[error("Query '{command}' failed: {reason}")]
    QueryFailed {
        /// Command as sent, without terminator
        command: String,
        /// Transport error text
        reason: String,
    },

    /// The answer to a query is not a number
    #[error("Malformed reading for '{command}': {response:?}")]
    MalformedReading {
        /// Command as sent, without terminator
        command: String,
        /// Raw answer, framing included
        response: String,
    },

    /// gnuplot could not be started or fed
    #[error("Plotting unavailable: {0}")]
    PlottingUnavailable(String),

    /// Dataset file could not be written
    #[error("Dataset I/O error: {0}")]
    Dataset(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but invalid
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Transport compiled out of this build
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for RampError {
    fn from(value: figment::Error) -> Self {
        RampError::Config(Box::new(value))
    }
}

impl RampError {
    /// Whether a run may continue after this error.
    pub fn can_recover(&self) -> bool {
        matches!(self, RampError::PlottingUnavailable(_))
    }

    /// Whether the error originates from the instrument or its transport.
    pub fn is_instrument_failure(&self) -> bool {
        matches!(
            self,
            RampError::TransportUnavailable(_)
                | RampError::SetupRejected(_)
                | RampError::SendFailed { .. }
                | RampError::QueryFailed { .. }
                | RampError::MalformedReading { .. }
        )
    }

    pub(crate) fn send_failed(command: &str, reason: impl ToString) -> Self {
        RampError::SendFailed {
            command: command.trim_end().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn query_failed(command: &str, reason: impl ToString) -> Self {
        RampError::QueryFailed {
            command: command.trim_end().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_plotting_is_recoverable() {
        assert!(RampError::PlottingUnavailable("gnuplot".into()).can_recover());
        assert!(!RampError::TransportUnavailable("GPIB0::5".into()).can_recover());
        assert!(!RampError::Dataset(std::io::Error::other("disk full")).can_recover());
    }

    #[test]
    fn classifies_instrument_failures() {
        let err = RampError::send_failed("VSET 1.000000\n", "bus timeout");
        assert!(err.is_instrument_failure());
        assert_eq!(err.to_string(), "Error executing 'VSET 1.000000': bus timeout");

        let err = RampError::MalformedReading {
            command: "VOUT?".into(),
            response: "garbage".into(),
        };
        assert!(err.is_instrument_failure());
        assert!(!RampError::Configuration("bad".into()).is_instrument_failure());
    }
}
