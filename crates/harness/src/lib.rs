//! Command-line harness for the procurement sagas.
//!
//! Wires the record store, event sink and saga engine together from
//! environment configuration, runs one saga per invocation and prints its
//! report as JSON. `demo` runs a fixed set of scenarios in memory.

pub mod cli;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;
pub mod telemetry;

pub use commands::{CommandOutcome, run};
pub use config::{Config, LogFormat};
pub use error::{HarnessError, Result};
