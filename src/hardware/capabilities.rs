//! Hardware Capabilities
//!
//! The acquisition core talks to the outside world through three small traits
//! instead of concrete devices:
//!
//! - [`InstrumentLink`]: the bus-addressed power supply (send, query, reset)
//! - [`PlotSink`]: the live plotting process (accepts script text, never answers)
//! - [`KeySource`]: the operator's keyboard (non-blocking poll)
//!
//! This keeps the loop free of transport details and lets tests swap in the
//! doubles from [`crate::hardware::mock`].
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is synchronous; the whole run is one cooperative loop
//! - Uses [`RampError`] for failures
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust
//! use psu_ramp::hardware::capabilities::InstrumentLink;
//! use psu_ramp::hardware::mock::MockSupply;
//!
//! let mut supply = MockSupply::new();
//! supply.send("VSET 2.500000").unwrap();
//! let volt = supply.query("VOUT?").unwrap();
//! assert!((volt - 2.5).abs() < 1e-3);
//! ```

use crate::error::{AppResult, RampError};
use crate::instrument::hp663x::RESET_COMMAND;

/// Capability: bus-addressed instrument
///
/// # Contract
/// - `send` writes one command (terminator added by the transport)
/// - `query_raw` writes one query and returns the device's answer, framing included
/// - `reset` returns the device to a safe, output-off state
/// - No retries: any error is final for the caller
pub trait InstrumentLink {
    /// Send a command that produces no response
    fn send(&mut self, command: &str) -> AppResult<()>;

    /// Send a query and return the raw response text
    fn query_raw(&mut self, command: &str) -> AppResult<String>;

    /// Put the device into its reset state (output off, settings cleared)
    fn reset(&mut self) -> AppResult<()> {
        self.send(RESET_COMMAND)
    }

    /// Human-readable transport description for logs
    fn describe(&self) -> String {
        "instrument".to_string()
    }

    /// Send a query and parse the answer as a number
    ///
    /// See [`parse_reading`] for the framing assumptions.
    fn query(&mut self, command: &str) -> AppResult<f64> {
        let response = self.query_raw(command)?;
        parse_reading(command, &response)
    }
}

impl<L: InstrumentLink + ?Sized> InstrumentLink for Box<L> {
    fn send(&mut self, command: &str) -> AppResult<()> {
        (**self).send(command)
    }

    fn query_raw(&mut self, command: &str) -> AppResult<String> {
        (**self).query_raw(command)
    }

    fn reset(&mut self) -> AppResult<()> {
        (**self).reset()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Capability: plot renderer
///
/// Receives complete script text. There is no response channel, so a successful
/// `apply` only means the text was handed over.
pub trait PlotSink {
    /// Hand script text to the plotting process
    fn apply(&mut self, script: &str) -> AppResult<()>;
}

/// A key observed on the operator's input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Printable or control character
    Char(char),
    /// The escape key
    Escape,
}

impl From<u8> for Key {
    fn from(byte: u8) -> Self {
        match byte {
            27 => Key::Escape,
            other => Key::Char(char::from(other)),
        }
    }
}

/// Capability: operator input
pub trait KeySource {
    /// Return a pending key, if any, without blocking
    fn poll_nonblocking(&mut self) -> Option<Key>;
}

/// Parse a numeric instrument response.
///
/// HP663x supplies answer with fixed-width numeric text padded with blanks and
/// terminated by CR/LF, e.g. `" 12.009\r\n"` for `VOUT?` or `"-0.0005\r\n"` for
/// `IOUT?`. The framing is stripped and the remainder must be a finite number;
/// anything else is a [`RampError::MalformedReading`].
pub fn parse_reading(command: &str, response: &str) -> AppResult<f64> {
    let text = response.trim_end_matches(['\r', '\n', '\0']).trim();
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RampError::MalformedReading {
            command: command.to_string(),
            response: response.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_width_responses() {
        assert_eq!(parse_reading("VOUT?", " 12.009\r\n").unwrap(), 12.009);
        assert_eq!(parse_reading("IOUT?", "-0.0005\r\n").unwrap(), -0.0005);
        assert_eq!(parse_reading("VOUT?", "0.000").unwrap(), 0.0);
    }

    #[test]
    fn rejects_malformed_responses() {
        for bad in ["", "\r\n", "ERR", "12.0.1\r\n", "NaN\r\n", "inf"] {
            let err = parse_reading("VOUT?", bad).unwrap_err();
            assert!(
                matches!(err, RampError::MalformedReading { ref command, .. } if command == "VOUT?"),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn maps_escape_byte() {
        assert_eq!(Key::from(27), Key::Escape);
        assert_eq!(Key::from(b'q'), Key::Char('q'));
    }
}
