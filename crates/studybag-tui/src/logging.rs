//! Tracing initialization.
//!
//! The filter comes from `STUDYBAG_LOG` (same syntax as `RUST_LOG`) and
//! defaults to `info`. The terminal UI owns the screen, so it logs to a file
//! under the cache directory; the one-shot commands log to stderr.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "STUDYBAG_LOG";

fn create_env_filter() -> Result<EnvFilter> {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {e}"))
}

pub fn log_file_path() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("studybag");
    Ok(dir.join("studybag.log"))
}

/// Appends to the log file; returns its path.
pub fn init_file() -> Result<PathBuf> {
    let path = log_file_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(create_env_filter()?)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(path)
}

pub fn init_stderr() -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(create_env_filter()?)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(())
}
