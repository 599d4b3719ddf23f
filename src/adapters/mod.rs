//! Real instrument transports and the transport factory.
//!
//! | Transport  | Feature             | Crate        |
//! |------------|---------------------|--------------|
//! | `prologix` | `instrument_serial` | `serialport` |
//! | `visa`     | `instrument_visa`   | `visa-rs`    |
//! | `mock`     | always available    |              |

pub mod serial_adapter;
pub mod visa_adapter;

pub use serial_adapter::{PrologixLink, PrologixSettings};
pub use visa_adapter::{gpib_resource, VisaLink};

use std::time::Duration;

use tracing::info;

use crate::config::{InstrumentConfig, TransportKind};
use crate::error::AppResult;
use crate::hardware::capabilities::InstrumentLink;
use crate::hardware::mock::MockSupply;

/// Open the transport selected in the configuration
pub fn connect(config: &InstrumentConfig) -> AppResult<Box<dyn InstrumentLink>> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let link: Box<dyn InstrumentLink> = match config.transport {
        TransportKind::Mock => Box::new(MockSupply::new()),
        TransportKind::Visa => Box::new(VisaLink::open(
            &gpib_resource(config.board, config.address),
            timeout,
        )?),
        TransportKind::Prologix => Box::new(PrologixLink::open(PrologixSettings {
            port_name: config.serial_port.clone(),
            baud_rate: config.baud_rate,
            address: config.address,
            timeout,
        })?),
    };
    info!(link = %link.describe(), "Instrument transport connected");
    Ok(link)
}
