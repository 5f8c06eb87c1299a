//! Application logging functionality
//!
//! Logs go to `~/.config/fontlive/logs/fontlive-YYYY-MM-DD.log` and to
//! stderr. `RUST_LOG` overrides the default `info` filter.

use crate::core::config::settings::APP_NAME;
use crate::core::config::ConfigFile;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the file writer alive; dropping it flushes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    pub fn log_file(&self) -> &Path {
        &self.path
    }
}

/// Get the name of today's log file
pub fn log_file_name() -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d");
    format!("{APP_NAME}-{timestamp}.log")
}

/// Install the global subscriber writing to the log directory and stderr.
///
/// `verbose` lowers the default filter to `debug`.
pub fn init_logging(verbose: bool) -> io::Result<LoggingGuard> {
    init_logging_in(&ConfigFile::logs_dir(), verbose)
}

fn init_logging_in(log_dir: &Path, verbose: bool) -> io::Result<LoggingGuard> {
    fs::create_dir_all(log_dir)?;
    let file_name = log_file_name();

    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_names(true);

    // stdout carries compiled output and JSON, so the console gets stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path: log_dir.join(file_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_is_dated() {
        let name = log_file_name();
        assert!(name.starts_with("fontlive-"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "fontlive-YYYY-MM-DD.log".len());
    }

    #[test]
    fn test_guard_reports_dated_file_in_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let guard = init_logging_in(&log_dir, false).unwrap();
        assert!(log_dir.is_dir());
        assert_eq!(guard.log_file(), log_dir.join(log_file_name()));
    }
}
