//! The background timer loop.
//!
//! A worker serves exactly one interval. Each poll re-reads the row, writes a
//! heartbeat when one is due and finishes the interval once the effective
//! worked time reaches the target. Every decision is taken from the store, so
//! pauses, cancels and recoveries made by other processes are picked up on
//! the next poll.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CoreError, StoreError};
use crate::interval::{Interval, IntervalStatus, Resolution};
use crate::notification::{DialogResolver, NoopResolver, Resolver};
use crate::process::PidFile;
use crate::storage::{Config, IntervalStore, Paths};

use super::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TimerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

/// Why a timer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "exit", rename_all = "snake_case")]
pub enum LoopExit {
    /// The interval row no longer exists.
    Missing,
    /// Another process moved the interval out of `running`.
    NotRunning { status: IntervalStatus },
    /// This loop finished the interval. `resolution` is the answer that was
    /// recorded, if any.
    Finished { resolution: Option<Resolution> },
    /// Another process changed the row between the read and the finish.
    FinishRaceLost,
}

pub struct TimerLoop<'s, C, R> {
    store: &'s IntervalStore,
    interval_id: i64,
    clock: C,
    resolver: R,
    settings: TimerSettings,
    last_heartbeat: Option<i64>,
    exit: Option<LoopExit>,
}

impl<'s, C: Clock, R: Resolver> TimerLoop<'s, C, R> {
    pub fn new(
        store: &'s IntervalStore,
        interval_id: i64,
        clock: C,
        resolver: R,
        settings: TimerSettings,
    ) -> Self {
        Self {
            store,
            interval_id,
            clock,
            resolver,
            settings,
            last_heartbeat: None,
            exit: None,
        }
    }

    pub fn interval_id(&self) -> i64 {
        self.interval_id
    }

    /// Poll until the loop exits. Store errors that are not a lost race end
    /// the loop with an error.
    pub fn run(&mut self) -> Result<LoopExit, StoreError> {
        loop {
            if let Some(exit) = self.tick()? {
                return Ok(exit);
            }
            self.clock.sleep(self.settings.poll_interval);
        }
    }

    /// One poll. Once the loop has exited, further ticks return the same exit
    /// without touching the store.
    pub fn tick(&mut self) -> Result<Option<LoopExit>, StoreError> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }
        let exit = self.poll()?;
        if let Some(exit) = exit {
            info!(interval_id = self.interval_id, ?exit, "Timer loop exiting");
            self.exit = Some(exit);
        }
        Ok(exit)
    }

    fn poll(&mut self) -> Result<Option<LoopExit>, StoreError> {
        let Some(interval) = self.store.get(self.interval_id)? else {
            return Ok(Some(LoopExit::Missing));
        };
        if interval.status != IntervalStatus::Running {
            return Ok(Some(LoopExit::NotRunning {
                status: interval.status,
            }));
        }

        let now = self.clock.now();
        self.heartbeat(now);

        if interval.effective_worked(now) < interval.duration_sec {
            return Ok(None);
        }
        self.finish(&interval, now).map(Some)
    }

    fn heartbeat(&mut self, now: i64) {
        let every = i64::try_from(self.settings.heartbeat_interval.as_secs())
            .unwrap_or(i64::MAX)
            .max(1);
        if self.last_heartbeat.is_some_and(|last| now - last < every) {
            return;
        }
        match self.store.update_heartbeat(self.interval_id, now) {
            Ok(()) => self.last_heartbeat = Some(now),
            // the next poll sees the new status
            Err(e) if e.is_precondition_failed() => {
                debug!(interval_id = self.interval_id, "Heartbeat skipped, interval changed");
            }
            Err(e) => warn!(interval_id = self.interval_id, error = %e, "Heartbeat failed"),
        }
    }

    fn finish(&mut self, interval: &Interval, now: i64) -> Result<LoopExit, StoreError> {
        match self.store.finish(interval.id, interval.duration_sec, now) {
            Ok(()) => {}
            Err(e) if e.is_precondition_failed() => return Ok(LoopExit::FinishRaceLost),
            Err(e) => return Err(e),
        }
        info!(interval_id = interval.id, "Interval finished");

        let Some(resolution) = self.resolver.resolve(interval) else {
            info!(interval_id = interval.id, "No resolution given, left finished");
            return Ok(LoopExit::Finished { resolution: None });
        };
        match self.store.resolve(interval.id, resolution, self.clock.now()) {
            Ok(()) => {
                info!(interval_id = interval.id, %resolution, "Interval resolved");
                Ok(LoopExit::Finished {
                    resolution: Some(resolution),
                })
            }
            Err(e) if e.is_precondition_failed() => {
                info!(interval_id = interval.id, "Interval was resolved elsewhere");
                Ok(LoopExit::Finished { resolution: None })
            }
            Err(e) => Err(e),
        }
    }
}

/// Entry point of the `worker` process: claim the PID record, open the store
/// and serve `interval_id` until the loop exits.
pub fn run_worker(paths: &Paths, config: &Config, interval_id: i64) -> Result<LoopExit, CoreError> {
    let _pid = PidFile::new(&paths.worker_pid_path).claim(interval_id)?;
    let store = IntervalStore::open(&paths.db_path, config.busy_timeout())?;
    info!(interval_id, pid = std::process::id(), "Timer worker started");

    let resolver: Box<dyn Resolver> = if config.notifications.enabled {
        Box::new(DialogResolver::new(config.resolution_timeout()))
    } else {
        Box::new(NoopResolver)
    };
    let settings = TimerSettings::from_config(config);
    let exit = TimerLoop::new(&store, interval_id, SystemClock, resolver, settings).run()?;
    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::clock::ManualClock;

    fn settings() -> TimerSettings {
        TimerSettings {
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
        }
    }

    #[test]
    fn heartbeat_written_on_first_tick_then_every_interval() {
        let store = IntervalStore::open_memory().unwrap();
        let iv = store.create(1500, 1_000).unwrap();
        let clock = ManualClock::new(1_000);
        let mut tl = TimerLoop::new(&store, iv.id, &clock, NoopResolver, settings());

        assert_eq!(tl.tick().unwrap(), None);
        assert_eq!(store.get(iv.id).unwrap().unwrap().heartbeat_at, Some(1_000));

        clock.set(1_009);
        tl.tick().unwrap();
        assert_eq!(store.get(iv.id).unwrap().unwrap().heartbeat_at, Some(1_000));

        clock.set(1_010);
        tl.tick().unwrap();
        assert_eq!(store.get(iv.id).unwrap().unwrap().heartbeat_at, Some(1_010));
    }

    #[test]
    fn exit_is_sticky() {
        let store = IntervalStore::open_memory().unwrap();
        let iv = store.create(1500, 1_000).unwrap();
        store.cancel(iv.id, 0, 1_001).unwrap();
        let clock = ManualClock::new(1_002);
        let mut tl = TimerLoop::new(&store, iv.id, &clock, NoopResolver, settings());

        let exit = LoopExit::NotRunning {
            status: IntervalStatus::Cancelled,
        };
        assert_eq!(tl.tick().unwrap(), Some(exit));
        assert_eq!(tl.tick().unwrap(), Some(exit));
    }

    #[test]
    fn missing_interval_exits() {
        let store = IntervalStore::open_memory().unwrap();
        let clock = ManualClock::new(0);
        let mut tl = TimerLoop::new(&store, 99, &clock, NoopResolver, settings());
        assert_eq!(tl.run().unwrap(), LoopExit::Missing);
        assert_eq!(tl.interval_id(), 99);
    }
}
