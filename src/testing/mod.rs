//! Scenario runner
//!
//! Reads YAML scenarios, drives an engine subprocess through the harness
//! and checks the resulting transcript against a recorded expectations file.

mod config;
mod runner;

pub use config::*;
pub use runner::{expectations_path, load_scenario, run_scenario, RunOptions, TestResult};
