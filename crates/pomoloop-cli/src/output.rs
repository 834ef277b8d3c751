//! Text or JSON rendering of command results.

use std::error::Error;

use pomoloop_core::time_fmt::{format_datetime, format_mmss};
use pomoloop_core::timer::control::{
    CancelOutcome, FinishOutcome, HistoryEntry, PauseOutcome, ResumeOutcome, StatusReport,
};
use pomoloop_core::{ConfigError, ControlError, DailyCount, IntervalStatus, StoreError};
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print `value` as one JSON object, or the text produced by `text`.
    pub fn emit<T: Serialize>(
        &self,
        value: &T,
        text: impl FnOnce() -> String,
    ) -> Result<(), serde_json::Error> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }

    /// Side information for humans; suppressed in JSON mode so stdout stays
    /// a single object.
    pub fn notice(&self, message: &str) {
        if !self.json {
            eprintln!("{message}");
        }
    }

    pub fn fail(&self, err: &(dyn Error + 'static)) {
        let code = error_code(err);
        if self.json {
            let body = ErrorBody {
                error: code,
                message: err.to_string(),
            };
            match serde_json::to_string(&body) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("error: {err}"),
            }
        } else {
            eprintln!("error: {err}");
        }
    }
}

/// Stable code for an error reaching the command boundary.
pub fn error_code(err: &(dyn Error + 'static)) -> &'static str {
    if let Some(e) = err.downcast_ref::<ControlError>() {
        return e.code();
    }
    if let Some(StoreError::Busy) = err.downcast_ref::<StoreError>() {
        return "STORE_BUSY";
    }
    if let Some(ConfigError::UnknownKey(_) | ConfigError::InvalidValue { .. }) =
        err.downcast_ref::<ConfigError>()
    {
        return "INVALID_CONFIG";
    }
    "INTERNAL"
}

pub fn started_text(duration_sec: i64) -> String {
    format!("Pomodoro started: {}.", format_mmss(duration_sec))
}

pub fn paused_text(outcome: &PauseOutcome) -> String {
    format!(
        "Paused. Worked: {}, left: {}.",
        format_mmss(outcome.worked_sec),
        format_mmss(outcome.remaining_sec)
    )
}

pub fn resumed_text(outcome: &ResumeOutcome) -> String {
    format!(
        "Resumed. Worked: {}, left: {}.",
        format_mmss(outcome.worked_sec),
        format_mmss(outcome.remaining_sec)
    )
}

pub fn cancelled_text(outcome: &CancelOutcome) -> String {
    format!("Cancelled. Worked: {}.", format_mmss(outcome.worked_sec))
}

pub fn finished_text(outcome: &FinishOutcome) -> String {
    format!(
        "Interval marked as {}. Worked: {}.",
        outcome.resolution,
        format_mmss(outcome.worked_sec)
    )
}

pub fn status_text(report: &StatusReport, short: bool) -> String {
    let Some(iv) = &report.interval else {
        return if short {
            format!("No active interval · {} today", report.today_completed)
        } else {
            format!(
                "No active interval. Today: {} completed.",
                report.today_completed
            )
        };
    };

    if short {
        let prefix = if iv.status == IntervalStatus::Running {
            String::new()
        } else {
            format!("{} · ", capitalize(iv.status.as_str()))
        };
        return format!(
            "{prefix}{} left · {} worked · {} today",
            format_mmss(iv.remaining_sec),
            format_mmss(iv.worked_sec),
            report.today_completed
        );
    }

    format!(
        "Status:   {}\nDuration: {}\nWorked:   {}\nLeft:     {}\nToday:    {} completed",
        iv.status,
        format_mmss(iv.duration_sec),
        format_mmss(iv.worked_sec),
        format_mmss(iv.remaining_sec),
        report.today_completed
    )
}

pub fn history_text(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No intervals found.".to_string();
    }
    let mut lines = vec![format!(
        "{:<16}  {:>8}  {:>8}  {}",
        "Date", "Duration", "Worked", "Status"
    )];
    for entry in entries {
        lines.push(format!(
            "{:<16}  {:>8}  {:>8}  {}",
            format_datetime(entry.started_at),
            format_mmss(entry.duration_sec),
            format_mmss(entry.worked_sec),
            entry.status
        ));
    }
    lines.join("\n")
}

pub fn daily_text(days: &[DailyCount]) -> String {
    if days.is_empty() {
        return "No completed intervals found.".to_string();
    }
    let mut lines = vec![format!("{:<10}  {:>9}", "Date", "Completed")];
    for day in days {
        lines.push(format!("{:<10}  {:>9}", day.date, day.completed));
    }
    lines.join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
