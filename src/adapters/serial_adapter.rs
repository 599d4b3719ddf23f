//! Serial transport through a Prologix-style GPIB-USB controller
//!
//! The controller shows up as a serial port. Lines starting with `++` configure
//! the controller itself; every other line is forwarded to the addressed GPIB
//! device. On open the controller is put into:
//!
//! - `++mode 1`: controller-in-charge
//! - `++addr N`: talk to the supply's primary address
//! - `++auto 0`: no automatic read-after-write, queries ask explicitly
//! - `++eoi 1`: assert EOI with the last byte
//!
//! A query writes the command, then `++read eoi`, and reads up to LF.

use std::time::Duration;

use crate::error::{AppResult, RampError};
use crate::hardware::capabilities::InstrumentLink;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::io::{Read, Write};
#[cfg(feature = "instrument_serial")]
use std::time::Instant;
#[cfg(feature = "instrument_serial")]
use tracing::{debug, info};

/// Controller setup lines sent once after the port opens
pub fn controller_init(address: u8) -> [String; 4] {
    [
        "++mode 1".to_string(),
        format!("++addr {address}"),
        "++auto 0".to_string(),
        "++eoi 1".to_string(),
    ]
}

/// Serial port settings for the controller
#[derive(Debug, Clone)]
pub struct PrologixSettings {
    /// Serial device, e.g. `/dev/ttyUSB0`
    pub port_name: String,
    pub baud_rate: u32,
    /// GPIB primary address of the supply
    pub address: u8,
    /// Upper bound for one response
    pub timeout: Duration,
}

/// Link to one GPIB instrument behind a Prologix controller
pub struct PrologixLink {
    settings: PrologixSettings,
    #[cfg(feature = "instrument_serial")]
    port: Box<dyn SerialPort>,
}

impl PrologixLink {
    /// Open the port and configure the controller
    #[cfg(feature = "instrument_serial")]
    pub fn open(settings: PrologixSettings) -> AppResult<Self> {
        let port = serialport::new(&settings.port_name, settings.baud_rate)
            // Short per-read timeout; the overall deadline is enforced in read_line
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| {
                RampError::TransportUnavailable(format!(
                    "cannot open serial port '{}' at {} baud: {e}",
                    settings.port_name, settings.baud_rate
                ))
            })?;

        let mut link = Self { settings, port };
        for line in controller_init(link.settings.address) {
            link.write_line(&line).map_err(|e| {
                RampError::TransportUnavailable(format!("controller setup '{line}': {e}"))
            })?;
        }
        info!(
            port = %link.settings.port_name,
            baud = link.settings.baud_rate,
            address = link.settings.address,
            "Prologix controller ready"
        );
        Ok(link)
    }

    /// Always fails: built without `instrument_serial`
    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(settings: PrologixSettings) -> AppResult<Self> {
        let _ = settings;
        Err(RampError::FeatureNotEnabled("instrument_serial".to_string()))
    }

    #[cfg(feature = "instrument_serial")]
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()
    }

    /// Read bytes up to and including LF, within the configured timeout
    #[cfg(feature = "instrument_serial")]
    fn read_line(&mut self) -> Result<String, String> {
        let mut response = Vec::new();
        let mut buffer = [0u8; 1];
        let start = Instant::now();

        loop {
            if start.elapsed() > self.settings.timeout {
                return Err(format!("read timeout after {:?}", self.settings.timeout));
            }

            match self.port.read(&mut buffer) {
                Ok(1) => {
                    response.push(buffer[0]);
                    if buffer[0] == b'\n' {
                        break;
                    }
                }
                Ok(0) => return Err("unexpected end of stream".to_string()),
                Ok(_) => return Err("read returned more than requested".to_string()),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.to_string()),
            }
        }

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

impl InstrumentLink for PrologixLink {
    #[cfg(feature = "instrument_serial")]
    fn send(&mut self, command: &str) -> AppResult<()> {
        debug!(command, "Serial send");
        self.write_line(command)
            .map_err(|e| RampError::send_failed(command, e))
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn send(&mut self, command: &str) -> AppResult<()> {
        let _ = command;
        Err(RampError::FeatureNotEnabled("instrument_serial".to_string()))
    }

    #[cfg(feature = "instrument_serial")]
    fn query_raw(&mut self, command: &str) -> AppResult<String> {
        self.write_line(command)
            .and_then(|_| self.write_line("++read eoi"))
            .map_err(|e| RampError::query_failed(command, e))?;
        let response = self
            .read_line()
            .map_err(|reason| RampError::query_failed(command, reason))?;
        debug!(command, response = response.trim_end(), "Serial query");
        Ok(response)
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn query_raw(&mut self, command: &str) -> AppResult<String> {
        let _ = command;
        Err(RampError::FeatureNotEnabled("instrument_serial".to_string()))
    }

    fn describe(&self) -> String {
        format!(
            "Prologix {} @ {} baud, GPIB address {}",
            self.settings.port_name, self.settings.baud_rate, self.settings.address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_init_sequence() {
        assert_eq!(
            controller_init(5),
            ["++mode 1", "++addr 5", "++auto 0", "++eoi 1"].map(String::from)
        );
    }

    #[test]
    fn test_missing_port_is_transport_failure() {
        let result = PrologixLink::open(PrologixSettings {
            port_name: "/dev/does-not-exist-psu".to_string(),
            baud_rate: 115_200,
            address: 5,
            timeout: Duration::from_millis(100),
        });
        match result {
            Err(RampError::TransportUnavailable(_)) | Err(RampError::FeatureNotEnabled(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing port must fail"),
        }
    }
}
