//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for a ramp run.
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (HP6633A at GPIB address 5, 1 s sampling, no ramp)
//! 2. An optional TOML file
//! 3. Environment variables (prefixed with PSU_RAMP_, nested keys split on `__`)
//!
//! Command line flags are applied on top by the binary.
//!
//! # Example
//! ```no_run
//! use psu_ramp::config::RampConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RampConfig::load_from(Some("config/psu_ramp.toml"))?;
//! config.validate()?;
//! println!("Supply: {}", config.instrument.model);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, RampError};
use crate::experiment::ramp::RampSpec;
use crate::instrument::hp663x::SupplyModel;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Bus and device settings
    pub instrument: InstrumentConfig,
    /// Output setpoint and protection limits
    pub supply: SupplyConfig,
    /// Voltage ramp settings
    pub ramp: RampSettings,
    /// Sampling cadence
    pub acquisition: AcquisitionConfig,
    /// Dataset file settings
    pub output: OutputConfig,
    /// Live plotting settings
    pub plot: PlotConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Program tag written into the dataset header
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

/// Which transport carries the GPIB traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Simulated supply, no hardware required
    Mock,
    /// VISA resource `GPIB<board>::<address>::INSTR`
    Visa,
    /// Prologix-style GPIB-USB controller on a serial port
    Prologix,
}

/// Instrument transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Bus transport
    pub transport: TransportKind,
    /// GPIB board index
    pub board: u32,
    /// GPIB primary address (0-30)
    pub address: u8,
    /// Serial device of the GPIB controller (prologix transport only)
    pub serial_port: String,
    /// Serial speed of the GPIB controller
    pub baud_rate: u32,
    /// Per-call bus timeout in milliseconds
    pub timeout_ms: u64,
    /// Supply model, sets the default limits
    pub model: SupplyModel,
    /// Reset the supply before and after the run
    pub reset: bool,
}

/// Output setpoint and protection limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplyConfig {
    /// Static output voltage, or ramp lower bound
    pub voltage: f64,
    /// Overvoltage limit (OVSET); defaults to the model maximum
    pub voltage_limit: Option<f64>,
    /// Current limit (ISET); defaults to the model maximum
    pub current_limit: Option<f64>,
    /// Trip the output on overcurrent instead of limiting
    pub overcurrent_trip: bool,
}

/// Voltage ramp settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RampSettings {
    /// Ramp upper bound in volts
    pub upper_voltage: f64,
    /// Signed increment in millivolts; 0 disables ramping
    pub step_mv: i32,
    /// Run the ramp back down after reaching its bound
    pub dual: bool,
}

/// Sampling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Delay between steps/samples in tenths of a second; 0 configures and exits
    pub interval_ds: u32,
    /// Flush the dataset and refresh the plot every this many samples
    pub flush_every: u32,
    /// Print a live progress line on stdout
    pub progress: bool,
}

/// Dataset file settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Dataset file; required unless only configuring
    pub path: Option<PathBuf>,
    /// Free text for the dataset header
    pub comment: String,
    /// Overwrite an existing file without asking
    pub overwrite: bool,
}

/// Live plotting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Start gnuplot for a live view
    pub enabled: bool,
    /// gnuplot executable
    pub gnuplot: String,
    /// Keep the plot window until a key is pressed
    pub wait_for_key: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "psu-ramp".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Prologix,
            board: 0,
            address: 5,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 1000,
            model: SupplyModel::Hp6633,
            reset: true,
        }
    }
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            voltage: 0.0,
            voltage_limit: None,
            current_limit: None,
            overcurrent_trip: false,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval_ds: 10,
            flush_every: 100,
            progress: true,
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gnuplot: "gnuplot".to_string(),
            wait_for_key: true,
        }
    }
}

impl RampConfig {
    /// Load defaults, then the optional TOML file, then `PSU_RAMP_` environment variables
    ///
    /// Example: PSU_RAMP_INSTRUMENT__ADDRESS=7
    pub fn load_from<P: AsRef<Path>>(path: Option<P>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(RampConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path.as_ref()));
        }
        let config = figment
            .merge(Env::prefixed("PSU_RAMP_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Effective overvoltage limit
    pub fn voltage_limit(&self) -> f64 {
        self.supply
            .voltage_limit
            .unwrap_or(self.instrument.model.max_volt())
    }

    /// Effective current limit
    pub fn current_limit(&self) -> f64 {
        self.supply
            .current_limit
            .unwrap_or(self.instrument.model.max_amp())
    }

    /// True when a voltage ramp was requested
    pub fn is_ramp(&self) -> bool {
        self.ramp.step_mv != 0
    }

    /// True when the run only applies settings and exits
    pub fn is_configure_only(&self) -> bool {
        self.acquisition.interval_ds == 0
    }

    /// Delay between cycles
    pub fn interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.acquisition.interval_ds) * 100)
    }

    /// Whether the supply is reset around the run
    ///
    /// Configure-only runs keep the applied settings.
    pub fn reset_on_exit(&self) -> bool {
        self.instrument.reset && !self.is_configure_only()
    }

    /// Whether live plotting is attempted
    pub fn plotting_enabled(&self) -> bool {
        self.plot.enabled && !self.is_configure_only()
    }

    /// Ramp bounds derived from the setpoint and the upper voltage
    ///
    /// A positive step ramps up from `supply.voltage` to `ramp.upper_voltage`, a
    /// negative step ramps down the other way. Returns `None` when not ramping.
    pub fn ramp_spec(&self) -> Option<RampSpec> {
        if !self.is_ramp() {
            return None;
        }
        let (start_volt, end_volt) = if self.ramp.step_mv > 0 {
            (self.supply.voltage, self.ramp.upper_voltage)
        } else {
            (self.ramp.upper_voltage, self.supply.voltage)
        };
        Some(RampSpec {
            start_volt,
            end_volt,
            step_mv: self.ramp.step_mv,
            dual: self.ramp.dual,
        })
    }

    /// Validate configuration after loading and CLI overrides
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(RampError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let max_volt = self.instrument.model.max_volt();
        let max_amp = self.instrument.model.max_amp();
        let in_volt_range = |v: f64| v.is_finite() && (0.0..=max_volt).contains(&v);

        if !in_volt_range(self.supply.voltage) || !in_volt_range(self.ramp.upper_voltage) {
            return invalid(format!("Voltage must be in range 0...{max_volt} V."));
        }
        if !in_volt_range(self.voltage_limit()) {
            return invalid(format!("Voltage limit must be in range 0...{max_volt} V."));
        }
        let amp = self.current_limit();
        if !amp.is_finite() || !(0.0..=max_amp).contains(&amp) {
            return invalid(format!("Current limit must be in range 0...{max_amp} A."));
        }
        if self.is_ramp() && !(1..=1000).contains(&self.ramp.step_mv.unsigned_abs()) {
            return invalid("Ramp steps must be in range (+/-)1...1000 mV.".to_string());
        }
        if !(1..=10_000).contains(&self.acquisition.flush_every) {
            return invalid("Flush must occur every 1...10000 points.".to_string());
        }
        if self.instrument.address > 30 {
            return invalid("Primary address must be between 0 and 30.".to_string());
        }
        if self.acquisition.interval_ds > 600 {
            return invalid("Delay must be 1 ... 600 (1/10 s).".to_string());
        }
        if self.ramp.dual && !self.is_ramp() {
            return invalid("Dual ramp (-R) requires a ramp increment (-r).".to_string());
        }
        if self.is_ramp() && self.ramp.upper_voltage < self.supply.voltage {
            return invalid(
                "Upper ramp voltage (-U) must be higher than set voltage (-u).".to_string(),
            );
        }
        if self.is_ramp() && self.ramp.upper_voltage > self.voltage_limit() {
            return invalid(
                "Upper ramp voltage (-U) must be less than voltage limit (-M).".to_string(),
            );
        }
        if !self.is_configure_only() && self.output.path.is_none() {
            return invalid("Please specify a data file.".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RampConfig {
        let mut config = RampConfig::default();
        config.output.path = Some(PathBuf::from("run.dat"));
        config
    }

    #[test]
    fn test_defaults_match_hp6633() {
        let config = RampConfig::default();
        assert_eq!(config.instrument.address, 5);
        assert_eq!(config.voltage_limit(), 50.0);
        assert_eq!(config.current_limit(), 2.0);
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.acquisition.flush_every, 100);
        assert!(!config.is_ramp());
    }

    #[test]
    fn test_config_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = valid_config();
        config.application.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_path_required_unless_configure_only() {
        let mut config = RampConfig::default();
        assert!(config.validate().is_err());

        config.acquisition.interval_ds = 0;
        assert!(config.validate().is_ok());
        assert!(!config.reset_on_exit());
        assert!(!config.plotting_enabled());
    }

    #[test]
    fn test_ramp_spec_direction() {
        let mut config = valid_config();
        config.supply.voltage = 1.0;
        config.ramp.upper_voltage = 4.0;
        config.ramp.step_mv = 250;
        let spec = config.ramp_spec().unwrap();
        assert_eq!((spec.start_volt, spec.end_volt), (1.0, 4.0));

        config.ramp.step_mv = -250;
        let spec = config.ramp_spec().unwrap();
        assert_eq!((spec.start_volt, spec.end_volt), (4.0, 1.0));
    }

    #[test]
    fn test_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("ramp.toml", "[instrument]\naddress = 7\n")?;
            jail.set_env("PSU_RAMP_ACQUISITION__FLUSH_EVERY", "25");
            let config = RampConfig::load_from(Some("ramp.toml")).unwrap();
            assert_eq!(config.instrument.address, 7);
            assert_eq!(config.acquisition.flush_every, 25);
            Ok(())
        });
    }
}
