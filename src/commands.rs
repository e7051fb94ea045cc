//! CLI command definitions
//!
//! Defines the clap commands for the inspector test runner.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a YAML test scenario against an engine
    Run {
        /// Path to the scenario file
        scenario: PathBuf,

        /// Engine executable (default: from config, then PATH)
        #[arg(long)]
        engine: Option<PathBuf>,

        /// Print every frontend/backend message into the transcript
        #[arg(long)]
        dump_protocol: bool,

        /// Rewrite the expected transcript instead of comparing against it
        #[arg(long)]
        update: bool,

        /// Show engine details and debug logging
        #[arg(long, short)]
        verbose: bool,
    },

    /// Render a JSON message as a structured dump
    Dump {
        /// JSON file holding one message
        file: PathBuf,

        /// Mask volatile ids before rendering
        #[arg(long)]
        normalize: bool,

        /// Text placed before the first line
        #[arg(long)]
        title: Option<String>,
    },

    /// Show the configuration file location and effective settings
    Config,
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Run { verbose: true, .. })
    }
}
