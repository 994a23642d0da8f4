//! Logging setup.
//!
//! Logs go to stderr unless a log directory is configured, in which case a
//! daily rolling file is written there instead.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "FACEMATCH_LOG";

/// Keeps the background file writer alive for the life of the process
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the logging system.
///
/// The level is read from `FACEMATCH_LOG` (`debug`, `info`, `warn`, `error`
/// or any `EnvFilter` directive) and defaults to `info`.
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let env_filter = filter();

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("Logging already initialized")?;
        return Ok(());
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "facematch.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .context("Logging already initialized")?;

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}
