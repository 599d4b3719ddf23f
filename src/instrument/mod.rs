//! Power supply driver and readback.
pub mod hp663x;
pub mod reader;

pub use hp663x::{Hp663x, SupplyModel, SupplySettings};
pub use reader::{Reading, SampleReader};
