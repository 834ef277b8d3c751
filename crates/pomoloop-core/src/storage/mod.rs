mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, NotificationsConfig, StoreConfig, TimerConfig};
pub use database::{IntervalStore, DEFAULT_BUSY_TIMEOUT};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// Resolution order: `explicit`, then `POMOLOOP_DATA_DIR`, then
/// `~/.config/pomoloop[-dev]/` based on POMOLOOP_ENV.
///
/// Set POMOLOOP_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => match std::env::var_os("POMOLOOP_DATA_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let base_dir = dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config");
                let env = std::env::var("POMOLOOP_ENV").unwrap_or_else(|_| "production".to_string());
                if env == "dev" {
                    base_dir.join("pomoloop-dev")
                } else {
                    base_dir.join("pomoloop")
                }
            }
        },
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Well-known files inside the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub worker_pid_path: PathBuf,
    pub log_path: PathBuf,
    pub config_path: PathBuf,
}

impl Paths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            db_path: data_dir.join("pomoloop.db"),
            worker_pid_path: data_dir.join("worker.pid"),
            log_path: data_dir.join("pomoloop.log"),
            config_path: data_dir.join("config.toml"),
            data_dir,
        }
    }

    /// Resolve the data directory (see [`data_dir`]) and derive the paths.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Ok(Self::new(data_dir(explicit)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_is_created_and_used() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("data");
        let paths = Paths::resolve(Some(&dir)).unwrap();
        assert!(dir.is_dir());
        assert_eq!(paths.db_path, dir.join("pomoloop.db"));
        assert_eq!(paths.worker_pid_path, dir.join("worker.pid"));
    }
}
