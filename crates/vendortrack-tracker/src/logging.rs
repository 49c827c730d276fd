//! Logging initialization and configuration.
//!
//! This module provides environment-aware logging setup:
//! - **Production**: JSON logs to rolling files + compact logs to stdout
//! - **Development**: Pretty logs to stdout

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vendortrack_core::LoggingConfig;

/// Overrides the configured level when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "VENDORTRACK_LOG_LEVEL";

/// Static guards to keep non-blocking writers alive.
/// These must persist for the lifetime of the program.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the logging system.
///
/// The filter comes from `RUST_LOG`, then `VENDORTRACK_LOG_LEVEL`, then
/// `config.level`.
///
/// # Production Mode
///
/// - Logs to rolling daily files in `/var/log/vendortrack/`
/// - Also logs to stdout for systemd journal capture
/// - JSON format for structured logging in files
/// - Compact format for stdout (no ANSI colors)
///
/// # Development Mode
///
/// - Logs to stdout only with pretty formatting
/// - ANSI colors enabled
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = env_filter(config)?;

    if config.production {
        init_production(env_filter)
    } else {
        init_development(env_filter)
    }
}

fn env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| config.level.clone());
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&level))?)
}

/// Initialize production logging with file + stdout output.
fn init_production(env_filter: EnvFilter) -> anyhow::Result<()> {
    let log_dir = log_directory();

    // Ensure log directory exists
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir).ok();
    }

    // Rolling file appender - creates new file daily
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "vendortrack");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stdout)
        .with_target(true)
        .with_ansi(false); // No ANSI colors for journald

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    Ok(())
}

/// Initialize development logging with pretty stdout output.
fn init_development(env_filter: EnvFilter) -> anyhow::Result<()> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()?;

    Ok(())
}

/// Returns the appropriate log directory for the current platform.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/vendortrack")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "vendortrack")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_valid_path() {
        let dir = log_directory();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_configured_level_builds_filter() {
        let config = LoggingConfig {
            level: "vendortrack_core=debug,info".to_string(),
            production: false,
        };
        assert!(env_filter(&config).is_ok());
    }
}
