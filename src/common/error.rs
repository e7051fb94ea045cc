//! Error types for the inspector harness
//!
//! Protocol-level failures (a response carrying an `error` member) are not
//! represented here: they resolve normally and are judged by the caller.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the inspector harness
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Engine failed to start: {0}")]
    EngineStartFailed(String),

    #[error("Engine exited unexpectedly")]
    EngineCrashed,

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("Wire protocol error: {0}")]
    WireProtocol(String),

    // === Session Errors ===
    #[error("Session closed before '{0}' was answered")]
    SessionClosed(String),

    #[error("Request id {0} is already pending")]
    DuplicateRequestId(i64),

    #[error("Waiter for '{0}' was replaced by a newer listener")]
    ListenerReplaced(String),

    // === Dispatch Errors ===
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Handler for '{event}' panicked: {message}")]
    HandlerPanicked { event: String, message: String },

    // === Host Errors ===
    #[error("Host operation '{0}' is not supported by this host")]
    Unsupported(&'static str),

    #[error("Engine rejected '{command}': {message}")]
    ControlFailed { command: String, message: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Engine '{name}' not found. Searched: {searched}")]
    EngineNotFound { name: String, searched: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scenario: {0}")]
    Scenario(String),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),
}

impl Error {
    /// Create an engine not found error with search paths
    pub fn engine_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::EngineNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a malformed message error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage(reason.into())
    }

    /// Create a control command failure
    pub fn control_failed(command: &str, message: &str) -> Self {
        Self::ControlFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }
}
