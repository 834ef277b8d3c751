//! Timer worker lifecycle: liveness, spawning and crash recovery.
//!
//! Foreground commands never run the timer themselves. They make sure exactly
//! one detached worker exists for a running interval, and when they find a
//! running interval without a live worker they move it to `interrupted`.

mod liveness;
mod pid_file;
mod spawn;

pub use liveness::{is_process_alive, process_identity, Identity};
pub use pid_file::{PidFile, PidGuard, WorkerRecord};
pub use spawn::WorkerLauncher;

use std::ffi::OsString;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, StoreError};
use crate::interval::IntervalStatus;
use crate::storage::{IntervalStore, Paths};

/// A running interval is never recovered within this many seconds of its
/// last sign of life, so a worker that is still starting up is not mistaken
/// for a dead one.
pub const RECOVERY_GRACE_SEC: i64 = 5;

const SETTLE_POLL: Duration = Duration::from_millis(100);

pub trait WorkerProbe {
    /// The interval a live worker is serving, or `None` when no worker is
    /// alive.
    fn serving(&self) -> Option<i64>;
}

pub trait WorkerSpawner {
    fn spawn(&self, interval_id: i64) -> Result<u32, ProcessError>;
}

impl WorkerSpawner for WorkerLauncher {
    fn spawn(&self, interval_id: i64) -> Result<u32, ProcessError> {
        WorkerLauncher::spawn(self, interval_id)
    }
}

/// Liveness from the PID record: the record exists, the process exists, and
/// the process is one of ours. The record also names the interval.
#[derive(Debug, Clone)]
pub struct PidProbe {
    pid_file: PidFile,
    program_name: OsString,
}

impl PidProbe {
    pub fn new(pid_file: PidFile, program_name: impl Into<OsString>) -> Self {
        Self {
            pid_file,
            program_name: program_name.into(),
        }
    }
}

impl WorkerProbe for PidProbe {
    fn serving(&self) -> Option<i64> {
        let WorkerRecord { pid, interval_id } = self.pid_file.read()?;
        if !is_process_alive(pid) {
            debug!(pid, interval_id, "Recorded worker is gone");
            return None;
        }
        match process_identity(pid, &self.program_name) {
            Identity::Foreign => {
                debug!(pid, "Recorded pid belongs to another program");
                None
            }
            Identity::Defunct => {
                debug!(pid, interval_id, "Recorded worker exited");
                None
            }
            Identity::Matches | Identity::Unknown => Some(interval_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnsureOutcome {
    /// A live worker bound to this interval kept running past the settle
    /// window.
    AlreadyRunning,
    Spawned { pid: u32 },
    /// The interval stays running without a worker until the next
    /// reconcile interrupts it.
    SpawnFailed,
}

/// A running interval moved to `interrupted` by crash recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Recovered {
    pub interval_id: i64,
    pub worked_sec: i64,
}

pub struct WorkerManager<P, S> {
    probe: P,
    spawner: S,
    settle: Duration,
}

impl WorkerManager<PidProbe, WorkerLauncher> {
    /// Manager for workers launched from the running executable. `settle`
    /// should cover one worker poll.
    pub fn for_paths(paths: &Paths, settle: Duration) -> std::io::Result<Self> {
        let launcher = WorkerLauncher::current(&paths.data_dir)?;
        let probe = PidProbe::new(
            PidFile::new(&paths.worker_pid_path),
            launcher.program_name(),
        );
        Ok(Self::new(probe, launcher, settle))
    }
}

impl<P: WorkerProbe, S: WorkerSpawner> WorkerManager<P, S> {
    pub fn new(probe: P, spawner: S, settle: Duration) -> Self {
        Self {
            probe,
            spawner,
            settle,
        }
    }

    /// The interval served by the live worker, if there is one.
    pub fn serving(&self) -> Option<i64> {
        self.probe.serving()
    }

    /// Make sure a worker serves `interval_id`, which the caller has just
    /// moved to `running`.
    ///
    /// A live worker recorded for another interval never counts; it exits on
    /// its own once it sees that interval is no longer running. A worker
    /// recorded for this interval may have seen it paused and be about to
    /// exit. It is given `settle` to do so, and if it is still alive
    /// afterwards it has seen the interval running again.
    pub fn ensure_worker(&self, interval_id: i64) -> EnsureOutcome {
        if self.wait_for_exit(interval_id) {
            debug!(interval_id, "Worker already running");
            return EnsureOutcome::AlreadyRunning;
        }
        match self.spawner.spawn(interval_id) {
            Ok(pid) => EnsureOutcome::Spawned { pid },
            Err(e) => {
                warn!(interval_id, error = %e, "Failed to spawn timer worker");
                EnsureOutcome::SpawnFailed
            }
        }
    }

    // true if a worker for `interval_id` is still alive after the settle window
    fn wait_for_exit(&self, interval_id: i64) -> bool {
        let deadline = Instant::now() + self.settle;
        loop {
            match self.probe.serving() {
                Some(serving) if serving == interval_id => {}
                Some(serving) => {
                    debug!(interval_id, serving, "Live worker serves another interval");
                    return false;
                }
                None => return false,
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SETTLE_POLL.min(deadline - now));
        }
    }

    /// Crash recovery. If the latest interval is running, has no live worker
    /// recorded for it and showed no sign of life for [`RECOVERY_GRACE_SEC`], move it to
    /// `interrupted` with work credited up to its last heartbeat.
    ///
    /// Losing the race to another process that changed the row is not an
    /// error; there is simply nothing to recover.
    pub fn reconcile(
        &self,
        store: &IntervalStore,
        now: i64,
    ) -> Result<Option<Recovered>, StoreError> {
        let Some(interval) = store.latest()? else {
            return Ok(None);
        };
        if interval.status != IntervalStatus::Running {
            return Ok(None);
        }
        let last_seen = interval
            .heartbeat_at
            .into_iter()
            .chain(interval.run_started_at)
            .max()
            .unwrap_or(interval.started_at);
        if now - last_seen < RECOVERY_GRACE_SEC {
            return Ok(None);
        }
        if self.probe.serving() == Some(interval.id) {
            return Ok(None);
        }

        match store.recover(interval.id, now) {
            Ok(worked_sec) => {
                info!(interval_id = interval.id, worked_sec, "Recovered interval from dead worker");
                Ok(Some(Recovered {
                    interval_id: interval.id,
                    worked_sec,
                }))
            }
            Err(e) if e.is_precondition_failed() => {
                debug!(interval_id = interval.id, "Interval changed before recovery");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeProbe(Cell<Option<i64>>);

    impl WorkerProbe for FakeProbe {
        fn serving(&self) -> Option<i64> {
            self.0.get()
        }
    }

    #[derive(Default)]
    struct FakeSpawner {
        spawned: RefCell<Vec<i64>>,
        fail: bool,
    }

    impl WorkerSpawner for FakeSpawner {
        fn spawn(&self, interval_id: i64) -> Result<u32, ProcessError> {
            if self.fail {
                return Err(ProcessError::Spawn {
                    program: "pomoloop".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            self.spawned.borrow_mut().push(interval_id);
            Ok(1000 + interval_id as u32)
        }
    }

    fn manager(serving: Option<i64>) -> WorkerManager<FakeProbe, FakeSpawner> {
        WorkerManager::new(
            FakeProbe(Cell::new(serving)),
            FakeSpawner::default(),
            Duration::ZERO,
        )
    }

    #[test]
    fn ensure_spawns_when_no_worker() {
        let mgr = manager(None);
        assert_eq!(mgr.ensure_worker(7), EnsureOutcome::Spawned { pid: 1007 });
        assert_eq!(*mgr.spawner.spawned.borrow(), vec![7]);
    }

    #[test]
    fn ensure_keeps_live_worker() {
        let mgr = manager(Some(7));
        assert_eq!(mgr.ensure_worker(7), EnsureOutcome::AlreadyRunning);
        assert!(mgr.spawner.spawned.borrow().is_empty());
    }

    #[test]
    fn ensure_spawns_past_worker_of_another_interval() {
        let mgr = manager(Some(6));
        assert_eq!(mgr.ensure_worker(7), EnsureOutcome::Spawned { pid: 1007 });
        assert_eq!(*mgr.spawner.spawned.borrow(), vec![7]);
    }

    #[test]
    fn ensure_reports_spawn_failure() {
        let mgr = WorkerManager::new(
            FakeProbe(Cell::new(None)),
            FakeSpawner {
                fail: true,
                ..FakeSpawner::default()
            },
            Duration::ZERO,
        );
        assert_eq!(mgr.ensure_worker(7), EnsureOutcome::SpawnFailed);
    }

    #[test]
    fn reconcile_interrupts_dead_worker_with_heartbeat_credit() {
        let store = IntervalStore::open_memory().unwrap();
        let iv = store.create(1500, 1_000).unwrap();
        store.update_heartbeat(iv.id, 1_012).unwrap();

        let mgr = manager(None);
        let recovered = mgr.reconcile(&store, 1_050).unwrap();
        assert_eq!(
            recovered,
            Some(Recovered {
                interval_id: iv.id,
                worked_sec: 12
            })
        );
        let row = store.get(iv.id).unwrap().unwrap();
        assert_eq!(row.status, IntervalStatus::Interrupted);
        assert_eq!(row.worked_sec, 12);
    }

    #[test]
    fn reconcile_leaves_live_or_fresh_workers_alone() {
        let store = IntervalStore::open_memory().unwrap();
        let iv = store.create(1500, 1_000).unwrap();

        assert_eq!(manager(Some(iv.id)).reconcile(&store, 1_050).unwrap(), None);
        assert_eq!(manager(None).reconcile(&store, 1_002).unwrap(), None);
        assert_eq!(
            store.get(iv.id).unwrap().unwrap().status,
            IntervalStatus::Running
        );
    }

    #[test]
    fn reconcile_ignores_non_running_intervals() {
        let store = IntervalStore::open_memory().unwrap();
        assert_eq!(manager(None).reconcile(&store, 10).unwrap(), None);

        let iv = store.create(1500, 1_000).unwrap();
        store.pause(iv.id, 100, 1_100).unwrap();
        assert_eq!(manager(None).reconcile(&store, 5_000).unwrap(), None);
        assert_eq!(
            store.get(iv.id).unwrap().unwrap().status,
            IntervalStatus::Paused
        );
    }

    #[test]
    fn pid_probe_rejects_missing_and_dead_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = PidFile::new(dir.path().join("worker.pid"));
        let probe = PidProbe::new(file.clone(), "pomoloop");
        assert_eq!(probe.serving(), None);

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        file.write(WorkerRecord {
            pid,
            interval_id: 1,
        })
        .unwrap();
        assert_eq!(probe.serving(), None);
    }

    #[test]
    fn pid_probe_reports_interval_of_own_process() {
        let dir = tempfile::tempdir().unwrap();
        let file = PidFile::new(dir.path().join("worker.pid"));
        let exe = std::env::current_exe().unwrap();
        let probe = PidProbe::new(file.clone(), exe.file_name().unwrap());
        file.write(WorkerRecord {
            pid: std::process::id(),
            interval_id: 9,
        })
        .unwrap();
        assert_eq!(probe.serving(), Some(9));
    }

    // The previous interval's worker is still alive, blocked in its
    // resolution dialog, when the next interval starts.
    #[test]
    fn worker_left_in_dialog_does_not_serve_next_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntervalStore::open_memory().unwrap();
        let t = 1_700_000_000;

        let first = store.create(60, t).unwrap();
        store.finish(first.id, 60, t + 60).unwrap();
        let _dialog_worker = PidFile::new(dir.path().join("worker.pid"))
            .claim(first.id)
            .unwrap();
        store
            .resolve(first.id, crate::interval::Resolution::Completed, t + 70)
            .unwrap();
        let second = store.create(90, t + 80).unwrap();

        let exe = std::env::current_exe().unwrap();
        let probe = PidProbe::new(
            PidFile::new(dir.path().join("worker.pid")),
            exe.file_name().unwrap(),
        );
        assert_eq!(probe.serving(), Some(first.id));

        let mgr = WorkerManager::new(probe, FakeSpawner::default(), Duration::ZERO);
        assert_eq!(
            mgr.ensure_worker(second.id),
            EnsureOutcome::Spawned {
                pid: 1000 + second.id as u32
            }
        );
        assert_eq!(*mgr.spawner.spawned.borrow(), vec![second.id]);

        // the spawned worker never came up; the dialog worker does not hide it
        let recovered = mgr.reconcile(&store, t + 80 + 129).unwrap();
        assert_eq!(
            recovered,
            Some(Recovered {
                interval_id: second.id,
                worked_sec: 0
            })
        );
        assert_eq!(
            store.get(second.id).unwrap().unwrap().status,
            IntervalStatus::Interrupted
        );
    }
}
