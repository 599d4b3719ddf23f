//! HP6632A / HP6633A / HP6634A system power supply driver.
//!
//! The supplies speak a small command set over GPIB:
//!
//! | Command            | Meaning                                   |
//! |--------------------|-------------------------------------------|
//! | `OUT 0;RST;CLR`    | output off, reset, clear status           |
//! | `VSET <v>`         | program output voltage                    |
//! | `ISET <a>`         | program current limit                     |
//! | `OVSET <v>`        | program overvoltage protection            |
//! | `OCP 0\|1`         | overcurrent limits (0) or trips (1)       |
//! | `VOUT?` / `IOUT?`  | measured output voltage / current         |
//!
//! Numeric arguments are sent with six decimals.

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppResult, RampError};
use crate::hardware::capabilities::InstrumentLink;

/// Output off, reset, clear status
pub const RESET_COMMAND: &str = "OUT 0;RST;CLR";
/// Measured output voltage
pub const VOUT_QUERY: &str = "VOUT?";
/// Measured output current
pub const IOUT_QUERY: &str = "IOUT?";

/// Time the supply needs after a reset before it accepts settings
pub const RESET_SETTLE: Duration = Duration::from_secs(1);

/// Supported supply models and their output ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplyModel {
    /// 0-25 V, 0-4 A
    Hp6632,
    /// 0-50 V, 0-2 A
    Hp6633,
    /// 0-100 V, 0-1 A
    Hp6634,
}

impl SupplyModel {
    /// Maximum programmable voltage
    pub fn max_volt(&self) -> f64 {
        match self {
            SupplyModel::Hp6632 => 25.0,
            SupplyModel::Hp6633 => 50.0,
            SupplyModel::Hp6634 => 100.0,
        }
    }

    /// Maximum programmable current
    pub fn max_amp(&self) -> f64 {
        match self {
            SupplyModel::Hp6632 => 4.0,
            SupplyModel::Hp6633 => 2.0,
            SupplyModel::Hp6634 => 1.0,
        }
    }
}

impl fmt::Display for SupplyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupplyModel::Hp6632 => write!(f, "HP6632A"),
            SupplyModel::Hp6633 => write!(f, "HP6633A"),
            SupplyModel::Hp6634 => write!(f, "HP6634A"),
        }
    }
}

/// Operating point written by [`Hp663x::setup`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplySettings {
    /// Output voltage (VSET)
    pub volt: f64,
    /// Current limit (ISET)
    pub amp: f64,
    /// Overvoltage protection (OVSET)
    pub volt_limit: f64,
    /// Trip instead of limiting on overcurrent (OCP)
    pub overcurrent_trip: bool,
}

/// `VSET <v>` with the supply's six-decimal formatting
pub fn vset_command(volt: f64) -> String {
    format!("VSET {volt:.6}")
}

/// The combined setup command, sent as one bus write
pub fn setup_command(settings: &SupplySettings) -> String {
    format!(
        "VSET {:.6};ISET {:.6};OVSET {:.6};OCP {}",
        settings.volt,
        settings.amp,
        settings.volt_limit,
        u8::from(settings.overcurrent_trip)
    )
}

/// Driver owning the link to one supply
pub struct Hp663x<L: InstrumentLink> {
    link: L,
    reset_settle: Duration,
}

impl<L: InstrumentLink> Hp663x<L> {
    /// Wrap an already opened link
    pub fn new(link: L) -> Self {
        Self {
            link,
            reset_settle: RESET_SETTLE,
        }
    }

    /// Override the post-reset settle time
    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    /// Prepare the supply for a run, resetting it first when requested
    pub fn open(&mut self, reset: bool) -> AppResult<()> {
        info!(link = %self.link.describe(), reset, "Opening power supply");
        if reset {
            self.link
                .reset()
                .map_err(|e| RampError::SetupRejected(format!("reset during init: {e}")))?;
            thread::sleep(self.reset_settle);
        }
        Ok(())
    }

    /// Program voltage, current limit, overvoltage limit and OCP mode at once
    pub fn setup(&mut self, settings: &SupplySettings) -> AppResult<()> {
        let command = setup_command(settings);
        debug!(%command, "Applying operating mode");
        self.link
            .send(&command)
            .map_err(|e| RampError::SetupRejected(format!("mode setting: {e}")))
    }

    /// End the session, resetting the supply when requested
    pub fn close(&mut self, reset: bool) -> AppResult<()> {
        if reset {
            self.link.reset()?;
            info!("Power supply reset");
        }
        Ok(())
    }

    /// Borrow the underlying link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockSupply;

    #[test]
    fn test_model_ranges() {
        assert_eq!(SupplyModel::Hp6632.max_volt(), 25.0);
        assert_eq!(SupplyModel::Hp6633.max_amp(), 2.0);
        assert_eq!(SupplyModel::Hp6634.to_string(), "HP6634A");
    }

    #[test]
    fn test_command_formatting() {
        assert_eq!(vset_command(1.5), "VSET 1.500000");
        let settings = SupplySettings {
            volt: 0.0,
            amp: 2.0,
            volt_limit: 50.0,
            overcurrent_trip: true,
        };
        assert_eq!(
            setup_command(&settings),
            "VSET 0.000000;ISET 2.000000;OVSET 50.000000;OCP 1"
        );
    }

    #[test]
    fn test_open_setup_close_sequence() {
        let supply = MockSupply::new();
        let log = supply.call_log_handle();
        let mut psu = Hp663x::new(supply).with_reset_settle(Duration::ZERO);
        psu.open(true).unwrap();
        psu.setup(&SupplySettings {
            volt: 2.0,
            amp: 1.0,
            volt_limit: 10.0,
            overcurrent_trip: false,
        })
        .unwrap();
        psu.close(false).unwrap();

        assert_eq!(psu.link_mut().setpoint(), 2.0);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "OUT 0;RST;CLR",
                "VSET 2.000000;ISET 1.000000;OVSET 10.000000;OCP 0"
            ]
        );
    }

    #[test]
    fn test_failed_reset_is_setup_rejection() {
        let mut psu = Hp663x::new(MockSupply::new().fail_on("OUT", 1))
            .with_reset_settle(Duration::ZERO);
        assert!(matches!(psu.open(true), Err(RampError::SetupRejected(_))));
    }
}
