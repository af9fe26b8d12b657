//! Randomized workload simulator for the dashboard coordinator
//!
//! Runs grid typing bursts or board drag moves against a backend that fails at
//! a configurable rate, then checks that every record in view converged on the
//! server's copy.

#![warn(unreachable_pub)]

pub mod service;
pub mod simulator;

pub use service::FlakyService;
pub use simulator::{
    run_grid, run_pipeline, SimulatorConfig, SimulatorReport, Violation, Workload,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
