//! File logging for foreground commands and the worker.
//!
//! stdout belongs to command output, so every process appends its log lines
//! to `<data_dir>/pomoloop.log`. The filter comes from `POMOLOOP_LOG`
//! (default `info`).

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "POMOLOOP_LOG";

/// Install the global subscriber. Returns `false` when the log file cannot be
/// opened or a subscriber is already installed; the caller carries on without
/// logging.
pub fn init(log_path: &Path) -> bool {
    let file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .is_ok()
}
