//! Hardware Abstractions
//!
//! Capability traits the acquisition core is written against, and simulated
//! implementations for running without a bench.

pub mod capabilities;
pub mod mock;

pub use capabilities::{InstrumentLink, Key, KeySource, PlotSink};
