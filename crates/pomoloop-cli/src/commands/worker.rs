use pomoloop_core::timer::run_worker;

use super::{CommandResult, Context};

/// Hidden entry point of the detached timer worker. Prints nothing; progress
/// goes to the log file.
pub fn run(ctx: &Context, interval_id: i64) -> CommandResult {
    match run_worker(&ctx.paths, &ctx.config, interval_id) {
        Ok(exit) => {
            tracing::info!(interval_id, ?exit, "Timer worker done");
            Ok(())
        }
        Err(e) => {
            tracing::error!(interval_id, error = %e, "Timer worker failed");
            Err(e.into())
        }
    }
}
