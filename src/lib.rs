//! # PSU Ramp Core Library
//!
//! Voltage ramp and data acquisition for HP6632A/6633A/6634A system power
//! supplies. The library holds everything the `psu-ramp` binary needs, so the
//! control loop can be driven and tested without a bench.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (defaults, TOML, environment) and its
//!   validation.
//! - **`error`**: The `RampError` enum shared by every module.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`hardware`**: Capability traits (`InstrumentLink`, `PlotSink`, `KeySource`)
//!   and simulated implementations.
//! - **`adapters`**: Real transports (VISA, Prologix serial controller).
//! - **`instrument`**: The HP663x command set and per-cycle readback.
//! - **`experiment`**: The ramp state machine and the acquisition loop.
//! - **`data`**: Sample records and the tab-separated dataset writer.
//! - **`plot`**: gnuplot script rendering and the plot process.
//! - **`cancel`**: Operator cancellation from the keyboard.
//! - **`session`**: Startup and teardown order around one run.

pub mod adapters;
pub mod cancel;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod instrument;
pub mod logging;
pub mod plot;
pub mod session;
