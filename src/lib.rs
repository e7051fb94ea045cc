//! Inspector protocol test harness
//!
//! A client for a JSON-RPC style debugging protocol (commands correlated by
//! id, events routed by name) together with the utilities needed to write
//! deterministic tests against it: normalized message dumps, PASS/FAIL
//! expectations, sequential suites and a YAML scenario runner.

pub mod cli;
pub mod commands;
pub mod common;
pub mod harness;
pub mod protocol;
pub mod testing;
pub mod trace;
pub mod transport;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use harness::Harness;
pub use protocol::Session;
