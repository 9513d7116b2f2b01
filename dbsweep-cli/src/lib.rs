//! dbsweep command line runner.
//!
//! Loads a TOML run file, connects to the catalog database and runs one
//! database-set process to completion.

pub mod app;
pub mod args;
pub mod config;
pub mod error;
pub mod telemetry;
