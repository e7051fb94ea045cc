//! Inspector test runner
//!
//! Runs YAML test scenarios against a debugging-protocol engine and checks
//! the normalized transcript against recorded expectations.

use std::path::PathBuf;

use clap::Parser;
use inspector::cli;
use inspector::commands::Commands;
use inspector::common::logging;

#[derive(Parser)]
#[command(name = "inspector-test", about = "Inspector protocol test runner")]
#[command(version, long_about = None)]
struct Cli {
    /// Also write diagnostics to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.command.verbose();

    let _guard = match &cli.log_file {
        Some(path) => match logging::init_with_file(path, verbose) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("Error: cannot open log file '{}': {e}", path.display());
                std::process::exit(1);
            }
        },
        None => {
            logging::init_cli(verbose);
            None
        }
    };

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
