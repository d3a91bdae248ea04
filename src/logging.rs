//! Logging and tracing initialization.
//!
//! Structured logging via the `tracing` ecosystem, either pretty console
//! output or JSON, written to stderr or to a file. The terminal view uses a
//! file so log lines never land on the alternate screen.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub json: bool,
    /// Default to DEBUG instead of INFO for this crate.
    pub verbose: bool,
    /// Append here instead of writing to stderr.
    pub file: Option<PathBuf>,
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `verbose`.
///
/// Fails if a subscriber is already installed or the log file can't be opened.
pub fn init(config: LogConfig) -> Result<()> {
    let default_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "jobwatch={}",
            default_level.as_str().to_lowercase()
        ))
    });

    match (&config.file, config.json) {
        (Some(path), json) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let writer = Mutex::new(file);

            if json {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(writer).with_target(true))
                    .try_init()?;
            } else {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init()?;
            }
        }
        (None, true) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_current_span(true)
                        .with_target(true),
                )
                .try_init()?;
        }
        (None, false) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .try_init()?;
        }
    }

    Ok(())
}
