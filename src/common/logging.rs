//! Logging and tracing configuration
//!
//! Diagnostics go to stderr so they never mix with the test transcript,
//! which is written to stdout and compared against expectation files.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("inspector=debug,info")
        } else {
            EnvFilter::new("inspector=info,warn")
        }
    })
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli(verbose: bool) {
    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing with an additional log file
///
/// Protocol traffic is logged at DEBUG, so the file captures every frame
/// exchanged with the engine. The returned guard must be held until exit
/// so buffered lines are flushed.
pub fn init_with_file(log_file: &Path, verbose: bool) -> std::io::Result<WorkerGuard> {
    let dir = match log_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => paths::ensure_log_dir()?.unwrap_or_else(|| ".".into()),
    };
    std::fs::create_dir_all(&dir)?;

    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "inspector.log".into());

    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(guard)
}
