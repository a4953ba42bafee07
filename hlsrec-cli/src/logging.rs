//! Console and destination-scoped error log.
//!
//! Everything selected by the filter goes to the console; warnings and errors are
//! also appended to `hlsrec-errors.log` inside the recording destination so they
//! survive next to the segments they concern.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{AppError, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "hlsrec=info,hlsrec_engine=info";

/// Name of the error log written inside the destination directory.
pub const ERROR_LOG_FILE: &str = "hlsrec-errors.log";

/// Formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

fn console_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("hlsrec=debug,hlsrec_engine=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes the error log when dropped and must be held until
/// the process exits.
pub fn init_logging(destination: &Path, verbose: bool, quiet: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(destination)?;

    let file_appender = tracing_appender::rolling::never(destination, ERROR_LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(true)
                .with_target(verbose)
                .with_timer(LocalTimer)
                .with_filter(console_filter(verbose, quiet)),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer)
                .with_filter(LevelFilter::WARN),
        )
        .try_init()
        .map_err(|e| AppError::Logging(format!("Failed to set global default subscriber: {e}")))?;

    Ok(guard)
}
