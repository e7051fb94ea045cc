//! CLI command handling
//!
//! Dispatches CLI commands and formats their output.

use std::path::Path;

use colored::Colorize;
use serde_json::Value;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::testing::{self, RunOptions};
use crate::trace;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            scenario,
            engine,
            dump_protocol,
            update,
            verbose,
        } => {
            let config = Config::load()?;
            let options = RunOptions {
                engine,
                dump_protocol,
                update,
                verbose,
            };

            let result = testing::run_scenario(&scenario, &config, &options).await?;
            if result.passed {
                Ok(())
            } else {
                Err(Error::TestAssertion(
                    result
                        .error
                        .unwrap_or_else(|| format!("scenario '{}' failed", result.name)),
                ))
            }
        }

        Commands::Dump {
            file,
            normalize,
            title,
        } => {
            println!("{}", render_file(&file, normalize, title.as_deref())?);
            Ok(())
        }

        Commands::Config => {
            match paths::config_path() {
                Some(path) if path.exists() => {
                    println!("{} {}", "Config file:".cyan(), path.display());
                }
                Some(path) => {
                    println!(
                        "{} {} {}",
                        "Config file:".cyan(),
                        path.display(),
                        "(not present, using defaults)".dimmed()
                    );
                }
                None => println!("{}", "No config directory on this platform".yellow()),
            }

            let config = Config::load()?;
            println!("{:#?}", config);
            Ok(())
        }
    }
}

/// Read a JSON file and render it with the structured dumper
fn render_file(path: &Path, normalize: bool, title: Option<&str>) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let value: Value = serde_json::from_str(&content)?;
    let value = if normalize {
        trace::normalize(&value)
    } else {
        value
    };
    Ok(trace::dump(&value, title))
}
