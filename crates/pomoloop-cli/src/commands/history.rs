use pomoloop_core::timer::control::{self, HistoryEntry};
use pomoloop_core::timer::unix_now;
use pomoloop_core::DailyCount;
use serde::Serialize;

use super::{CommandResult, Context};
use crate::output::{daily_text, history_text};

#[derive(Serialize)]
struct Intervals {
    intervals: Vec<HistoryEntry>,
}

#[derive(Serialize)]
struct Days {
    days: Vec<DailyCount>,
}

pub fn run(ctx: &Context, limit: u32, daily: bool) -> CommandResult {
    let store = ctx.open_reconciled()?;
    if daily {
        let days = Days {
            days: control::daily_history(&store, limit)?,
        };
        ctx.out.emit(&days, || daily_text(&days.days))?;
    } else {
        let intervals = Intervals {
            intervals: control::history(&store, limit, unix_now())?,
        };
        ctx.out
            .emit(&intervals, || history_text(&intervals.intervals))?;
    }
    Ok(())
}
