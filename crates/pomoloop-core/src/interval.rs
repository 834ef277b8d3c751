//! Interval data model.
//!
//! An interval is one timed work session. Its status is a closed set with an
//! explicit mapping to the strings stored in SQLite; anything else read back
//! from the store is rejected as [`UnknownValue`].
//!
//! ## State Transitions
//!
//! ```text
//! running <-> paused
//! running -> finished -> (completed | abandoned)
//! running -> interrupted -> running
//! (running | paused | interrupted) -> cancelled
//! ```

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted string outside the known status/event set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}'")]
pub struct UnknownValue(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalStatus {
    Running,
    Paused,
    /// Timer elapsed; waiting for the user to resolve it.
    Finished,
    Completed,
    Abandoned,
    Cancelled,
    /// The worker died while running; only resume or cancel are allowed.
    Interrupted,
}

impl IntervalStatus {
    /// Statuses covered by the single-active-interval constraint.
    pub const ACTIVE: [IntervalStatus; 4] = [
        IntervalStatus::Running,
        IntervalStatus::Paused,
        IntervalStatus::Finished,
        IntervalStatus::Interrupted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IntervalStatus::Running => "running",
            IntervalStatus::Paused => "paused",
            IntervalStatus::Finished => "finished",
            IntervalStatus::Completed => "completed",
            IntervalStatus::Abandoned => "abandoned",
            IntervalStatus::Cancelled => "cancelled",
            IntervalStatus::Interrupted => "interrupted",
        }
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for IntervalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(IntervalStatus::Running),
            "paused" => Ok(IntervalStatus::Paused),
            "finished" => Ok(IntervalStatus::Finished),
            "completed" => Ok(IntervalStatus::Completed),
            "abandoned" => Ok(IntervalStatus::Abandoned),
            "cancelled" => Ok(IntervalStatus::Cancelled),
            "interrupted" => Ok(IntervalStatus::Interrupted),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// How a finished interval was resolved by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Honest work.
    Completed,
    /// Did not work.
    Abandoned,
}

impl Resolution {
    pub fn status(self) -> IntervalStatus {
        match self {
            Resolution::Completed => IntervalStatus::Completed,
            Resolution::Abandoned => IntervalStatus::Abandoned,
        }
    }

    pub fn event_type(self) -> EventType {
        match self {
            Resolution::Completed => EventType::Completed,
            Resolution::Abandoned => EventType::Abandoned,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status().as_str())
    }
}

impl FromStr for Resolution {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Resolution::Completed),
            "abandoned" => Ok(Resolution::Abandoned),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Audit log event type. Mirrors the status transitions plus `resumed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Started,
    Paused,
    Resumed,
    Finished,
    Completed,
    Abandoned,
    Cancelled,
    Interrupted,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Started => "started",
            EventType::Paused => "paused",
            EventType::Resumed => "resumed",
            EventType::Finished => "finished",
            EventType::Completed => "completed",
            EventType::Abandoned => "abandoned",
            EventType::Cancelled => "cancelled",
            EventType::Interrupted => "interrupted",
        }
    }
}

impl FromStr for EventType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(EventType::Started),
            "paused" => Ok(EventType::Paused),
            "resumed" => Ok(EventType::Resumed),
            "finished" => Ok(EventType::Finished),
            "completed" => Ok(EventType::Completed),
            "abandoned" => Ok(EventType::Abandoned),
            "cancelled" => Ok(EventType::Cancelled),
            "interrupted" => Ok(EventType::Interrupted),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

fn text_column<T: FromStr<Err = UnknownValue>>(value: ValueRef<'_>) -> FromSqlResult<T> {
    value
        .as_str()?
        .parse()
        .map_err(|e: UnknownValue| FromSqlError::Other(Box::new(e)))
}

impl FromSql for IntervalStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for IntervalStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EventType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for EventType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// One timed work session. All timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: i64,
    pub status: IntervalStatus,
    pub duration_sec: i64,
    /// Worked time excluding the in-progress running segment.
    pub worked_sec: i64,
    /// Start of the current running segment. Only set while running.
    pub run_started_at: Option<i64>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub heartbeat_at: Option<i64>,
}

impl Interval {
    /// Worked time including the current running segment, clamped to the
    /// target duration. Non-running intervals report `worked_sec` verbatim.
    pub fn effective_worked(&self, now: i64) -> i64 {
        match (self.status, self.run_started_at) {
            (IntervalStatus::Running, Some(run_started_at)) => {
                credit(self.worked_sec, run_started_at, now, self.duration_sec)
            }
            _ => self.worked_sec,
        }
    }

    pub fn remaining(&self, now: i64) -> i64 {
        (self.duration_sec - self.effective_worked(now)).max(0)
    }

    /// Worked time to credit when the worker died: the running segment is
    /// counted up to the last heartbeat only. Without a heartbeat nothing
    /// beyond `worked_sec` is credited.
    pub fn recovery_credit(&self) -> i64 {
        match (self.run_started_at, self.heartbeat_at) {
            (Some(run_started_at), Some(heartbeat_at)) => {
                credit(self.worked_sec, run_started_at, heartbeat_at, self.duration_sec)
            }
            _ => self.worked_sec,
        }
    }
}

// A clock that went backwards must not shrink worked time.
fn credit(worked_sec: i64, segment_start: i64, segment_end: i64, duration_sec: i64) -> i64 {
    let segment = (segment_end - segment_start).max(0);
    (worked_sec + segment).min(duration_sec).max(worked_sec)
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalEvent {
    pub id: i64,
    pub interval_id: i64,
    pub event_type: EventType,
    pub event_at: i64,
}

/// Completed intervals on one local calendar day (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub completed: u32,
}
