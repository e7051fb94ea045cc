//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::protocol::ChannelId;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct Scenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Record parsed scripts so source locations can be logged
    #[serde(default)]
    pub setup_script_map: bool,
    /// Print every protocol message to the transcript
    #[serde(default)]
    pub dump_protocol: bool,
    /// Overall time limit in seconds (default: 30)
    pub timeout: Option<u64>,
    /// Tests run in order as one suite
    pub tests: Vec<ScenarioTest>,
}

/// One named test: a banner followed by its steps
#[derive(Deserialize, Debug)]
pub struct ScenarioTest {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A single step in a test
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Invoke a domain member such as `Debugger.enable` or `Debugger.oncePaused`
    Call {
        /// `Domain.member`
        member: String,
        /// Command parameters (default: `{}`)
        params: Option<Value>,
        /// Target channel (default: 0)
        channel: Option<ChannelId>,
        /// Name used in PASS/FAIL lines (default: the member)
        name: Option<String>,
        /// Check the response for success or error
        expect: Option<Expectation>,
        /// What to log about the response or event
        #[serde(default)]
        log: LogMode,
        /// Send without waiting for the response
        #[serde(default)]
        detach: bool,
    },
    /// Print a line
    Log { text: String },
    /// Print a structured value
    LogObject { value: Value, title: Option<String> },
    /// Compile and run a classic script
    AddScript {
        source: String,
        url: Option<String>,
        #[serde(default)]
        line_offset: i32,
        #[serde(default)]
        column_offset: i32,
    },
    /// Compile and run a module
    AddModule {
        source: String,
        url: String,
        #[serde(default)]
        line_offset: i32,
        #[serde(default)]
        column_offset: i32,
    },
    /// Run a script file, relative to the scenario file
    LoadScript { path: PathBuf },
    /// Wait until the engine has drained queued tasks
    WaitPendingTasks,
    /// Pause on the next statement run in a context group
    SchedulePause {
        #[serde(default)]
        channel: ChannelId,
        reason: String,
        #[serde(default = "default_details")]
        details: String,
    },
    CancelPause {
        #[serde(default)]
        channel: ChannelId,
    },
    /// Create a context group and log its id
    CreateContextGroup,
}

fn default_details() -> String {
    "{}".to_string()
}

/// Expected outcome of a command
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Success,
    Error,
}

/// What a `call` step logs
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// The whole normalized message
    Message,
    /// Only the normalized `result` of a response
    Result,
    /// `functionName (url:line:column)` for each paused call frame
    CallFrames,
    /// Source text around the first paused location
    SourceLocation,
    #[default]
    None,
}
