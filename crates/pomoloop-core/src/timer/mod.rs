//! Timer: clock seam, foreground operations and the background loop.

pub mod clock;
pub mod control;
mod worker;

pub use clock::{unix_now, Clock, ManualClock, SystemClock};
pub use worker::{run_worker, LoopExit, TimerLoop, TimerSettings};
