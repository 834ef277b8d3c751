//! Foreground operations behind the CLI commands.
//!
//! Each operation reads the latest interval, checks the user-facing
//! precondition and performs one conditional mutation. A precondition that
//! held on read but failed at commit time means another process won the race
//! and is reported as [`ControlError::ConcurrentModification`].

use serde::Serialize;
use tracing::info;

use crate::error::{ControlError, StoreError};
use crate::interval::{DailyCount, Interval, IntervalStatus, Resolution};
use crate::storage::IntervalStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub interval_id: i64,
    pub duration_sec: i64,
    pub started_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PauseOutcome {
    pub interval_id: i64,
    pub worked_sec: i64,
    pub remaining_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeOutcome {
    pub interval_id: i64,
    /// Status the interval was resumed from.
    pub resumed_from: IntervalStatus,
    pub worked_sec: i64,
    pub remaining_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub interval_id: i64,
    pub worked_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishOutcome {
    pub interval_id: i64,
    pub resolution: Resolution,
    pub worked_sec: i64,
}

/// Snapshot of the active interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSnapshot {
    pub interval_id: i64,
    pub status: IntervalStatus,
    pub duration_sec: i64,
    pub worked_sec: i64,
    pub remaining_sec: i64,
    pub started_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub active: bool,
    #[serde(flatten)]
    pub interval: Option<ActiveSnapshot>,
    pub today_completed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub interval_id: i64,
    pub status: IntervalStatus,
    pub duration_sec: i64,
    pub worked_sec: i64,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

fn latest_status(store: &IntervalStore) -> Option<IntervalStatus> {
    store.latest().ok().flatten().map(|iv| iv.status)
}

fn race_lost(id: i64) -> impl FnOnce(StoreError) -> ControlError {
    move |err| match err {
        StoreError::PreconditionFailed { .. } => ControlError::ConcurrentModification { id },
        other => ControlError::Store(other),
    }
}

pub fn start(
    store: &IntervalStore,
    duration_sec: i64,
    now: i64,
) -> Result<StartOutcome, ControlError> {
    if duration_sec <= 0 {
        return Err(ControlError::InvalidDuration(format!("{duration_sec}s")));
    }
    if let Some(latest) = store.latest()? {
        if latest.status.is_active() {
            return Err(ControlError::ActiveIntervalExists {
                status: Some(latest.status),
            });
        }
    }
    let interval = store.create(duration_sec, now).map_err(|err| match err {
        StoreError::ActiveIntervalExists => ControlError::ActiveIntervalExists {
            status: latest_status(store),
        },
        other => ControlError::Store(other),
    })?;
    info!(interval_id = interval.id, duration_sec, "Interval started");
    Ok(StartOutcome {
        interval_id: interval.id,
        duration_sec: interval.duration_sec,
        started_at: interval.started_at,
    })
}

pub fn pause(store: &IntervalStore, now: i64) -> Result<PauseOutcome, ControlError> {
    let interval = match store.latest()? {
        Some(iv) if iv.status == IntervalStatus::Running => iv,
        other => {
            return Err(ControlError::NotRunning {
                status: other.map(|iv| iv.status),
            })
        }
    };
    let worked_sec = interval.effective_worked(now);
    store
        .pause(interval.id, worked_sec, now)
        .map_err(race_lost(interval.id))?;
    info!(interval_id = interval.id, worked_sec, "Interval paused");
    Ok(PauseOutcome {
        interval_id: interval.id,
        worked_sec,
        remaining_sec: (interval.duration_sec - worked_sec).max(0),
    })
}

pub fn resume(store: &IntervalStore, now: i64) -> Result<ResumeOutcome, ControlError> {
    let interval = match store.latest()? {
        Some(iv)
            if matches!(
                iv.status,
                IntervalStatus::Paused | IntervalStatus::Interrupted
            ) =>
        {
            iv
        }
        other => {
            return Err(ControlError::NotResumable {
                status: other.map(|iv| iv.status),
            })
        }
    };
    store
        .resume(interval.id, now)
        .map_err(race_lost(interval.id))?;
    info!(interval_id = interval.id, from = %interval.status, "Interval resumed");
    Ok(ResumeOutcome {
        interval_id: interval.id,
        resumed_from: interval.status,
        worked_sec: interval.worked_sec,
        remaining_sec: interval.remaining(now),
    })
}

pub fn cancel(store: &IntervalStore, now: i64) -> Result<CancelOutcome, ControlError> {
    let interval = match store.latest()? {
        Some(iv)
            if matches!(
                iv.status,
                IntervalStatus::Running | IntervalStatus::Paused | IntervalStatus::Interrupted
            ) =>
        {
            iv
        }
        other => {
            return Err(ControlError::NoActiveInterval {
                status: other.map(|iv| iv.status),
            })
        }
    };
    let worked_sec = interval.effective_worked(now);
    store
        .cancel(interval.id, worked_sec, now)
        .map_err(race_lost(interval.id))?;
    info!(interval_id = interval.id, worked_sec, "Interval cancelled");
    Ok(CancelOutcome {
        interval_id: interval.id,
        worked_sec,
    })
}

/// Resolve a `finished` interval by hand.
pub fn finish(
    store: &IntervalStore,
    resolution: Resolution,
    now: i64,
) -> Result<FinishOutcome, ControlError> {
    let interval = match store.latest()? {
        Some(iv) if iv.status == IntervalStatus::Finished => iv,
        other => {
            return Err(ControlError::NotFinished {
                status: other.map(|iv| iv.status),
            })
        }
    };
    store
        .resolve(interval.id, resolution, now)
        .map_err(race_lost(interval.id))?;
    info!(interval_id = interval.id, %resolution, "Interval resolved manually");
    Ok(FinishOutcome {
        interval_id: interval.id,
        resolution,
        worked_sec: interval.worked_sec,
    })
}

/// Parse a user-supplied resolution word.
pub fn parse_resolution(raw: &str) -> Result<Resolution, ControlError> {
    raw.trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| ControlError::InvalidResolution(raw.to_string()))
}

pub fn status(store: &IntervalStore, now: i64) -> Result<StatusReport, ControlError> {
    let today_completed = store.count_today_completed(now)?;
    let interval = store
        .active()?
        .map(|iv| snapshot(&iv, now));
    Ok(StatusReport {
        active: interval.is_some(),
        interval,
        today_completed,
    })
}

fn snapshot(interval: &Interval, now: i64) -> ActiveSnapshot {
    ActiveSnapshot {
        interval_id: interval.id,
        status: interval.status,
        duration_sec: interval.duration_sec,
        worked_sec: interval.effective_worked(now),
        remaining_sec: interval.remaining(now),
        started_at: interval.started_at,
    }
}

/// Most recent intervals first, with worked time as of `now`.
pub fn history(
    store: &IntervalStore,
    limit: u32,
    now: i64,
) -> Result<Vec<HistoryEntry>, ControlError> {
    Ok(store
        .history(limit)?
        .into_iter()
        .map(|iv| HistoryEntry {
            interval_id: iv.id,
            status: iv.status,
            duration_sec: iv.duration_sec,
            worked_sec: iv.effective_worked(now),
            started_at: iv.started_at,
            ended_at: iv.ended_at,
        })
        .collect())
}

/// Completed counts per local day, most recent day first.
pub fn daily_history(store: &IntervalStore, limit: u32) -> Result<Vec<DailyCount>, ControlError> {
    Ok(store.daily_completed(limit)?)
}
