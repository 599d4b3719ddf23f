//! Per-cycle readback of the supply's actual output.

use crate::error::AppResult;
use crate::hardware::capabilities::InstrumentLink;
use crate::instrument::hp663x::{IOUT_QUERY, VOUT_QUERY};

/// One validated voltage/current pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Measured output voltage (V)
    pub volt: f64,
    /// Measured output current (A)
    pub amp: f64,
}

/// Turns the `VOUT?` and `IOUT?` queries into a [`Reading`].
///
/// Voltage is always queried first. The first failure ends the read; no value is
/// ever substituted for a reading the device did not deliver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleReader;

impl SampleReader {
    /// Create a reader
    pub fn new() -> Self {
        Self
    }

    /// Query both outputs
    pub fn read<L: InstrumentLink + ?Sized>(&self, link: &mut L) -> AppResult<Reading> {
        let volt = link.query(VOUT_QUERY)?;
        let amp = link.query(IOUT_QUERY)?;
        Ok(Reading { volt, amp })
    }
}
