use std::time::Duration;

use pomoloop_core::process::EnsureOutcome;
use pomoloop_core::time_fmt::parse_duration;
use pomoloop_core::timer::control::{self, StartOutcome};
use pomoloop_core::timer::unix_now;
use pomoloop_core::ControlError;
use serde::Serialize;

use super::{CommandResult, Context};
use crate::output::{
    cancelled_text, finished_text, paused_text, resumed_text, started_text, status_text,
};

const WATCH_PERIOD: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct Started {
    #[serde(flatten)]
    outcome: StartOutcome,
    worker: EnsureOutcome,
}

pub fn start(ctx: &Context, duration: Option<String>) -> CommandResult {
    let raw = duration.unwrap_or_else(|| ctx.config.default_duration.clone());
    let duration_sec = parse_duration(&raw)
        .filter(|secs| *secs > 0)
        .ok_or_else(|| ControlError::InvalidDuration(raw.clone()))?;

    let store = ctx.open_reconciled()?;
    let outcome = control::start(&store, duration_sec, unix_now())?;
    let worker = ensure_worker(ctx, outcome.interval_id);
    let started = Started { outcome, worker };
    ctx.out
        .emit(&started, || started_text(started.outcome.duration_sec))?;
    Ok(())
}

pub fn pause(ctx: &Context) -> CommandResult {
    let store = ctx.open_reconciled()?;
    let outcome = control::pause(&store, unix_now())?;
    ctx.out.emit(&outcome, || paused_text(&outcome))?;
    Ok(())
}

pub fn resume(ctx: &Context) -> CommandResult {
    let store = ctx.open_reconciled()?;
    let outcome = control::resume(&store, unix_now())?;
    ensure_worker(ctx, outcome.interval_id);
    ctx.out.emit(&outcome, || resumed_text(&outcome))?;
    Ok(())
}

pub fn cancel(ctx: &Context) -> CommandResult {
    let store = ctx.open_reconciled()?;
    let outcome = control::cancel(&store, unix_now())?;
    ctx.out.emit(&outcome, || cancelled_text(&outcome))?;
    Ok(())
}

pub fn finish(ctx: &Context, resolution: &str) -> CommandResult {
    let resolution = control::parse_resolution(resolution)?;
    let store = ctx.open_reconciled()?;
    let outcome = control::finish(&store, resolution, unix_now())?;
    ctx.out.emit(&outcome, || finished_text(&outcome))?;
    Ok(())
}

pub fn status(ctx: &Context, short: bool, watch: bool) -> CommandResult {
    let store = ctx.open_reconciled()?;
    loop {
        let report = control::status(&store, unix_now())?;
        ctx.out.emit(&report, || status_text(&report, short))?;
        if !watch || !report.active {
            return Ok(());
        }
        std::thread::sleep(WATCH_PERIOD);
    }
}

// Spawn failures leave the interval running without a worker; the next
// command's reconcile moves it to interrupted.
fn ensure_worker(ctx: &Context, interval_id: i64) -> EnsureOutcome {
    match ctx.workers() {
        Ok(workers) => {
            let outcome = workers.ensure_worker(interval_id);
            if outcome == EnsureOutcome::SpawnFailed {
                ctx.out
                    .notice("warning: timer worker could not be started; see the log file.");
            }
            outcome
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot locate worker executable");
            ctx.out
                .notice("warning: timer worker could not be started; see the log file.");
            EnsureOutcome::SpawnFailed
        }
    }
}
