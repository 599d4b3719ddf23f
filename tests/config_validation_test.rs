//! Configuration validation tests
//!
//! Each rejected setting must produce the operator-facing message for that setting.

use std::path::PathBuf;

use psu_ramp::config::RampConfig;
use psu_ramp::error::RampError;
use psu_ramp::instrument::SupplyModel;

fn valid_config() -> RampConfig {
    let mut config = RampConfig::default();
    config.output.path = Some(PathBuf::from("run.dat"));
    config
}

fn rejection(config: &RampConfig) -> String {
    match config.validate() {
        Err(RampError::Configuration(msg)) => msg,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_default_run_is_valid() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_voltage_range_follows_model() {
    let mut config = valid_config();
    config.supply.voltage = 60.0;
    assert_eq!(rejection(&config), "Voltage must be in range 0...50 V.");

    config.instrument.model = SupplyModel::Hp6634;
    assert!(config.validate().is_ok());

    config.supply.voltage = -1.0;
    assert_eq!(rejection(&config), "Voltage must be in range 0...100 V.");
}

#[test]
fn test_current_limit_range() {
    let mut config = valid_config();
    config.instrument.model = SupplyModel::Hp6632;
    config.supply.current_limit = Some(4.5);
    assert_eq!(rejection(&config), "Current limit must be in range 0...4 A.");

    config.supply.current_limit = Some(f64::NAN);
    assert!(config.validate().is_err());
}

#[test]
fn test_ramp_step_range() {
    let mut config = valid_config();
    config.ramp.upper_voltage = 5.0;
    for step in [1001, -1001] {
        config.ramp.step_mv = step;
        assert_eq!(
            rejection(&config),
            "Ramp steps must be in range (+/-)1...1000 mV."
        );
    }
    for step in [1, -1, 1000, -1000] {
        config.ramp.step_mv = step;
        assert!(config.validate().is_ok(), "step {step} rejected");
    }
}

#[test]
fn test_flush_and_interval_ranges() {
    let mut config = valid_config();
    config.acquisition.flush_every = 0;
    assert_eq!(rejection(&config), "Flush must occur every 1...10000 points.");

    let mut config = valid_config();
    config.acquisition.interval_ds = 601;
    assert_eq!(rejection(&config), "Delay must be 1 ... 600 (1/10 s).");
}

#[test]
fn test_address_range() {
    let mut config = valid_config();
    config.instrument.address = 31;
    assert_eq!(rejection(&config), "Primary address must be between 0 and 30.");
}

#[test]
fn test_dual_requires_ramp() {
    let mut config = valid_config();
    config.ramp.dual = true;
    assert_eq!(
        rejection(&config),
        "Dual ramp (-R) requires a ramp increment (-r)."
    );
}

#[test]
fn test_ramp_bounds_ordering() {
    let mut config = valid_config();
    config.supply.voltage = 5.0;
    config.ramp.upper_voltage = 2.0;
    config.ramp.step_mv = 100;
    assert_eq!(
        rejection(&config),
        "Upper ramp voltage (-U) must be higher than set voltage (-u)."
    );

    config.ramp.upper_voltage = 20.0;
    config.supply.voltage_limit = Some(10.0);
    assert_eq!(
        rejection(&config),
        "Upper ramp voltage (-U) must be less than voltage limit (-M)."
    );
}

#[test]
fn test_data_file_required_for_acquisition() {
    let mut config = RampConfig::default();
    assert_eq!(rejection(&config), "Please specify a data file.");

    config.acquisition.interval_ds = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn test_toml_file_layers_over_defaults() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "psu_ramp.toml",
            r#"
            [instrument]
            transport = "mock"
            model = "hp6632"

            [ramp]
            upper_voltage = 12.0
            step_mv = -50
            dual = true

            [output]
            path = "cell.dat"
            "#,
        )?;
        let config = RampConfig::load_from(Some("psu_ramp.toml")).unwrap();
        assert_eq!(config.instrument.model, SupplyModel::Hp6632);
        assert_eq!(config.instrument.address, 5);
        assert_eq!(config.ramp.step_mv, -50);
        assert_eq!(config.acquisition.flush_every, 100);
        assert!(config.validate().is_ok());

        let spec = config.ramp_spec().unwrap();
        assert_eq!((spec.start_volt, spec.end_volt), (12.0, 0.0));
        Ok(())
    });
}
