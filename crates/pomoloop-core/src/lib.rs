//! # pomoloop Core Library
//!
//! Core logic for the pomoloop Pomodoro timer. Every operation is available
//! through the standalone CLI binary; the only state shared between processes
//! is the SQLite interval store.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite interval store with conditional transitions and an
//!   audit log, plus TOML configuration
//! - **Timer**: foreground operations and the background [`TimerLoop`] run by
//!   a detached worker process
//! - **Process**: worker PID record, liveness probing, spawning and crash
//!   recovery
//! - **Notification**: the [`Resolver`] asked how a finished interval went
//!
//! ## Key Components
//!
//! - [`IntervalStore`]: interval persistence and state machine
//! - [`TimerLoop`]: polls one interval until it leaves `running`
//! - [`WorkerManager`]: keeps exactly one worker alive for a running interval
//! - [`Config`]: application configuration management

pub mod error;
pub mod interval;
pub mod logging;
pub mod notification;
pub mod process;
pub mod storage;
pub mod time_fmt;
pub mod timer;

pub use error::{CoreError, ConfigError, ControlError, ProcessError, StoreError};
pub use interval::{DailyCount, EventType, Interval, IntervalEvent, IntervalStatus, Resolution};
pub use notification::{DialogResolver, NoopResolver, Resolver};
pub use process::{EnsureOutcome, Recovered, WorkerManager};
pub use storage::{Config, IntervalStore, Paths};
pub use timer::{Clock, LoopExit, ManualClock, SystemClock, TimerLoop, TimerSettings};
