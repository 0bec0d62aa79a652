use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub const DEBUG_ENV: &str = "BW_DEBUG";
pub const LOG_FILE: &str = "bw-tui.log";

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV).map(|v| v == "1").unwrap_or(false)
}

/// File logging behind `BW_DEBUG=1`; the terminal belongs to the UI, so
/// nothing is installed otherwise.
pub fn init() -> Result<()> {
    if !debug_enabled() {
        return Ok(());
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .with_context(|| format!("Failed to open {LOG_FILE}"))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "bw_tui=debug".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;
    tracing::debug!("debug logging enabled");
    Ok(())
}
