//! Core error types for pomoloop-core.
//!
//! Store errors keep "wrong state" (`PreconditionFailed`), "structural
//! conflict" (`ActiveIntervalExists`) and "store unavailable" (`Busy`,
//! `Query`) apart so callers can report each one differently.

use std::path::PathBuf;
use thiserror::Error;

use crate::interval::{IntervalStatus, UnknownValue};

/// Core error type for pomoloop-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Interval store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Foreground command errors
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// PID record and worker spawn errors
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by [`IntervalStore`](crate::storage::IntervalStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database file
    #[error("Failed to open interval store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A create was attempted while another interval is active
    #[error("An active interval already exists")]
    ActiveIntervalExists,

    /// The row is absent or its status does not allow the transition
    #[error("Interval {id} does not allow '{op}' in its current state")]
    PreconditionFailed { id: i64, op: &'static str },

    /// The write lock could not be acquired within the busy timeout
    #[error("Interval store is busy")]
    Busy,

    /// A persisted status or event type is outside the known set
    #[error("Unrecognized value in interval store: {0}")]
    UnknownValue(#[from] UnknownValue),

    /// Migration failed
    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    Query(#[source] rusqlite::Error),
}

impl StoreError {
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::PreconditionFailed { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Busy
            }
            rusqlite::Error::FromSqlConversionFailure(idx, ty, source) => {
                match source.downcast::<UnknownValue>() {
                    Ok(unknown) => StoreError::UnknownValue(*unknown),
                    Err(source) => StoreError::Query(rusqlite::Error::FromSqlConversionFailure(
                        idx, ty, source,
                    )),
                }
            }
            other => StoreError::Query(other),
        }
    }
}

/// Errors surfaced by the foreground operations in [`crate::timer::control`].
///
/// The "wrong state" variants carry the status of the latest interval (if
/// any) so the caller can explain what it found.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Invalid duration: {0}. Examples: 25, 25m, 90s, 10m30s.")]
    InvalidDuration(String),

    #[error("An active interval already exists.")]
    ActiveIntervalExists { status: Option<IntervalStatus> },

    #[error("No running interval to pause.")]
    NotRunning { status: Option<IntervalStatus> },

    #[error("No paused or interrupted interval to resume.")]
    NotResumable { status: Option<IntervalStatus> },

    #[error("No active interval to cancel.")]
    NoActiveInterval { status: Option<IntervalStatus> },

    #[error("No finished interval to resolve.")]
    NotFinished { status: Option<IntervalStatus> },

    #[error("Resolution must be 'completed' or 'abandoned', got '{0}'.")]
    InvalidResolution(String),

    /// The precondition held when read but a racing process changed the row
    /// before the mutation committed.
    #[error("Interval {id} was modified concurrently.")]
    ConcurrentModification { id: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControlError {
    /// Stable machine-readable code used by JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::InvalidDuration(_) => "INVALID_DURATION",
            ControlError::ActiveIntervalExists { .. } => "ACTIVE_INTERVAL_EXISTS",
            ControlError::NotRunning { .. } => "NOT_RUNNING",
            ControlError::NotResumable { .. } => "NOT_RESUMABLE",
            ControlError::NoActiveInterval { .. } => "NO_ACTIVE_INTERVAL",
            ControlError::NotFinished { .. } => "NOT_FINISHED",
            ControlError::InvalidResolution(_) => "INVALID_RESOLUTION",
            ControlError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            ControlError::Store(StoreError::Busy) => "STORE_BUSY",
            ControlError::Store(_) => "INTERNAL",
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-separated key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// PID record and worker spawn errors.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to write PID record {path}: {source}")]
    PidRecord {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn worker {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
