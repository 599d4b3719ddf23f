//! VISA transport for GPIB instruments
//!
//! Opens `GPIB<board>::<address>::INSTR` through the system VISA library.
//! Commands are LF-terminated; each query reads back one response line.
//!
//! The session timeout bounds every read and write, so a silent instrument
//! ends the run with a query error instead of hanging it.

use std::time::Duration;

use crate::error::{AppResult, RampError};
use crate::hardware::capabilities::InstrumentLink;

#[cfg(feature = "instrument_visa")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "instrument_visa")]
use tracing::{debug, info};

#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// VISA resource string for a GPIB instrument
pub fn gpib_resource(board: u32, address: u8) -> String {
    format!("GPIB{board}::{address}::INSTR")
}

#[cfg(feature = "instrument_visa")]
struct Session {
    // Declared before the resource manager so it closes first
    instr: Instrument,
    _rm: DefaultRM,
}

/// Link to one instrument through VISA
pub struct VisaLink {
    resource: String,
    timeout: Duration,
    #[cfg(feature = "instrument_visa")]
    session: Session,
}

impl VisaLink {
    /// Open the resource
    #[cfg(feature = "instrument_visa")]
    pub fn open(resource: &str, timeout: Duration) -> AppResult<Self> {
        let unavailable = |e: visa_rs::Error| {
            RampError::TransportUnavailable(format!("cannot open {resource}: {e}"))
        };
        let name = std::ffi::CString::new(resource)
            .map_err(|e| RampError::TransportUnavailable(format!("bad resource name: {e}")))?;

        let rm = DefaultRM::new().map_err(unavailable)?;
        let instr = rm
            .open(&name.into(), AccessMode::NO_LOCK, timeout)
            .map_err(unavailable)?;

        info!(resource, ?timeout, "VISA session opened");
        Ok(Self {
            resource: resource.to_string(),
            timeout,
            session: Session { instr, _rm: rm },
        })
    }

    /// Always fails: built without `instrument_visa`
    #[cfg(not(feature = "instrument_visa"))]
    pub fn open(resource: &str, timeout: Duration) -> AppResult<Self> {
        let _ = (resource, timeout);
        Err(RampError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    #[cfg(feature = "instrument_visa")]
    fn write_line(&mut self, command: &str) -> std::io::Result<()> {
        let line = format!("{command}\n");
        (&self.session.instr).write_all(line.as_bytes())
    }
}

impl InstrumentLink for VisaLink {
    #[cfg(feature = "instrument_visa")]
    fn send(&mut self, command: &str) -> AppResult<()> {
        debug!(command, "VISA send");
        self.write_line(command)
            .map_err(|e| RampError::send_failed(command, e))
    }

    #[cfg(not(feature = "instrument_visa"))]
    fn send(&mut self, command: &str) -> AppResult<()> {
        let _ = command;
        Err(RampError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    #[cfg(feature = "instrument_visa")]
    fn query_raw(&mut self, command: &str) -> AppResult<String> {
        self.write_line(command)
            .map_err(|e| RampError::query_failed(command, e))?;

        let mut response = String::new();
        let mut reader = BufReader::new(&self.session.instr);
        reader
            .read_line(&mut response)
            .map_err(|e| RampError::query_failed(command, e))?;
        debug!(command, response = response.trim_end(), "VISA query");
        Ok(response)
    }

    #[cfg(not(feature = "instrument_visa"))]
    fn query_raw(&mut self, command: &str) -> AppResult<String> {
        let _ = command;
        Err(RampError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    fn describe(&self) -> String {
        format!("VISA {} (timeout {:?})", self.resource, self.timeout)
    }
}
