//! Timer loop scenarios driven end to end with a manual clock.

use std::cell::Cell;
use std::time::Duration;

use pomoloop_core::process::WorkerProbe;
use pomoloop_core::timer::control;
use pomoloop_core::{
    Clock, EventType, Interval, IntervalStatus, IntervalStore, LoopExit, ManualClock, Resolution,
    Resolver, TimerLoop, TimerSettings, WorkerManager,
};

const T: i64 = 1_700_000_000;

fn settings() -> TimerSettings {
    TimerSettings {
        poll_interval: Duration::from_secs(1),
        heartbeat_interval: Duration::from_secs(10),
    }
}

/// Answers with a fixed resolution and counts how often it was asked.
struct Scripted {
    answer: Option<Resolution>,
    calls: Cell<u32>,
}

impl Scripted {
    fn new(answer: Option<Resolution>) -> Self {
        Self {
            answer,
            calls: Cell::new(0),
        }
    }
}

impl Resolver for Scripted {
    fn resolve(&self, _interval: &Interval) -> Option<Resolution> {
        self.calls.set(self.calls.get() + 1);
        self.answer
    }
}

struct Dead;

impl WorkerProbe for Dead {
    fn serving(&self) -> Option<i64> {
        None
    }
}

struct NeverSpawn;

impl pomoloop_core::process::WorkerSpawner for NeverSpawn {
    fn spawn(&self, _interval_id: i64) -> Result<u32, pomoloop_core::ProcessError> {
        unreachable!("recovery never spawns")
    }
}

#[test]
fn pause_gap_is_not_counted() {
    let store = IntervalStore::open_memory().unwrap();
    let id = control::start(&store, 1500, T).unwrap().interval_id;
    control::pause(&store, T + 10).unwrap();
    control::resume(&store, T + 40).unwrap();

    let clock = ManualClock::new(T + 40);
    let resolver = Scripted::new(Some(Resolution::Completed));
    let mut tl = TimerLoop::new(&store, id, &clock, &resolver, settings());

    let exit = tl.run().unwrap();
    assert_eq!(
        exit,
        LoopExit::Finished {
            resolution: Some(Resolution::Completed)
        }
    );
    assert_eq!(clock.now(), T + 1530);

    let row = store.get(id).unwrap().unwrap();
    assert_eq!(row.status, IntervalStatus::Completed);
    assert_eq!(row.worked_sec, 1500);
    assert_eq!(resolver.calls.get(), 1);

    let events: Vec<_> = store
        .events(id)
        .unwrap()
        .into_iter()
        .map(|e| (e.event_type, e.event_at))
        .collect();
    assert_eq!(
        events,
        vec![
            (EventType::Started, T),
            (EventType::Paused, T + 10),
            (EventType::Resumed, T + 40),
            (EventType::Finished, T + 1530),
            (EventType::Completed, T + 1530),
        ]
    );
}

#[test]
fn late_loop_finishes_with_clamped_worked_time() {
    let store = IntervalStore::open_memory().unwrap();
    let id = control::start(&store, 60, T).unwrap().interval_id;

    let clock = ManualClock::new(T + 500);
    let resolver = Scripted::new(None);
    let exit = TimerLoop::new(&store, id, &clock, &resolver, settings())
        .run()
        .unwrap();

    assert_eq!(exit, LoopExit::Finished { resolution: None });
    let row = store.get(id).unwrap().unwrap();
    assert_eq!(row.status, IntervalStatus::Finished);
    assert_eq!(row.worked_sec, 60);
    assert_eq!(row.ended_at, Some(T + 500));

    // no answer from the dialog: resolvable by hand later
    control::finish(&store, Resolution::Abandoned, T + 600).unwrap();
    assert_eq!(
        store.get(id).unwrap().unwrap().status,
        IntervalStatus::Abandoned
    );
}

#[test]
fn heartbeat_then_crash_credits_up_to_heartbeat() {
    let store = IntervalStore::open_memory().unwrap();
    let id = control::start(&store, 1500, T).unwrap().interval_id;

    // worker polls from T to T+12, heartbeating at T and T+10
    let clock = ManualClock::new(T);
    let resolver = Scripted::new(None);
    let mut tl = TimerLoop::new(&store, id, &clock, &resolver, settings());
    for _ in 0..=12 {
        assert_eq!(tl.tick().unwrap(), None);
        clock.advance(Duration::from_secs(1));
    }
    assert_eq!(store.get(id).unwrap().unwrap().heartbeat_at, Some(T + 10));
    drop(tl);

    let workers = WorkerManager::new(Dead, NeverSpawn, Duration::ZERO);
    let recovered = workers.reconcile(&store, T + 50).unwrap().unwrap();
    assert_eq!(recovered.worked_sec, 10);

    let row = store.get(id).unwrap().unwrap();
    assert_eq!(row.status, IntervalStatus::Interrupted);
    assert_eq!(row.worked_sec, 10);
    assert_eq!(row.run_started_at, None);
    assert_eq!(resolver.calls.get(), 0);
}

#[test]
fn explicit_heartbeat_recovery_scenario() {
    let store = IntervalStore::open_memory().unwrap();
    let id = control::start(&store, 1500, T).unwrap().interval_id;
    store.update_heartbeat(id, T + 12).unwrap();

    let workers = WorkerManager::new(Dead, NeverSpawn, Duration::ZERO);
    let recovered = workers.reconcile(&store, T + 50).unwrap().unwrap();
    assert_eq!(recovered.worked_sec, 12);

    // a worker still polling the old interval exits cleanly
    let clock = ManualClock::new(T + 51);
    let exit = TimerLoop::new(&store, id, &clock, Scripted::new(None), settings())
        .run()
        .unwrap();
    assert_eq!(
        exit,
        LoopExit::NotRunning {
            status: IntervalStatus::Interrupted
        }
    );
}

#[test]
fn cancel_is_noticed_on_next_poll() {
    let store = IntervalStore::open_memory().unwrap();
    let id = control::start(&store, 1500, T).unwrap().interval_id;

    let clock = ManualClock::new(T);
    let resolver = Scripted::new(Some(Resolution::Completed));
    let mut tl = TimerLoop::new(&store, id, &clock, &resolver, settings());
    assert_eq!(tl.tick().unwrap(), None);

    let cancelled = control::cancel(&store, T + 1).unwrap();
    assert_eq!(cancelled.worked_sec, 1);

    assert_eq!(
        tl.tick().unwrap(),
        Some(LoopExit::NotRunning {
            status: IntervalStatus::Cancelled
        })
    );
    assert_eq!(resolver.calls.get(), 0);
}

#[test]
fn manual_resolution_during_dialog_wins() {
    let store = IntervalStore::open_memory().unwrap();
    let id = control::start(&store, 60, T).unwrap().interval_id;

    // the user answers on the command line while the dialog is still open
    struct ResolvesElsewhere<'a>(&'a IntervalStore);
    impl Resolver for ResolvesElsewhere<'_> {
        fn resolve(&self, interval: &Interval) -> Option<Resolution> {
            self.0
                .resolve(interval.id, Resolution::Abandoned, interval.started_at + 70)
                .unwrap();
            Some(Resolution::Completed)
        }
    }

    let clock = ManualClock::new(T + 60);
    let exit = TimerLoop::new(&store, id, &clock, ResolvesElsewhere(&store), settings())
        .run()
        .unwrap();
    assert_eq!(exit, LoopExit::Finished { resolution: None });
    assert_eq!(
        store.get(id).unwrap().unwrap().status,
        IntervalStatus::Abandoned
    );
}

#[test]
fn second_start_leaves_active_interval_untouched() {
    let store = IntervalStore::open_memory().unwrap();
    let first = control::start(&store, 1500, T).unwrap();
    let before = store.get(first.interval_id).unwrap().unwrap();

    assert!(matches!(
        control::start(&store, 300, T + 5),
        Err(pomoloop_core::ControlError::ActiveIntervalExists { .. })
    ));
    assert_eq!(store.get(first.interval_id).unwrap().unwrap(), before);
    assert_eq!(store.history(10).unwrap().len(), 1);
}
