//! Time source for the timer loop.
//!
//! The loop only ever asks a [`Clock`] for the time and for sleeping, so tests
//! can drive a whole interval lifecycle with [`ManualClock`] in microseconds.

use std::cell::Cell;
use std::time::Duration;

pub trait Clock {
    /// Current unix time in seconds.
    fn now(&self) -> i64;

    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> i64 {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        unix_now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A clock that only moves when told to. Sleeping advances it.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: Cell<i64>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now_ms: Cell::new(now * 1_000),
        }
    }

    pub fn set(&self, now: i64) {
        self.now_ms.set(now * 1_000);
    }

    pub fn advance(&self, duration: Duration) {
        let step = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.set(self.now_ms.get().saturating_add(step));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now_ms.get().div_euclid(1_000)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(100);
        clock.sleep(Duration::from_millis(500));
        assert_eq!(clock.now(), 100);
        clock.sleep(Duration::from_millis(500));
        assert_eq!(clock.now(), 101);
        clock.set(50);
        assert_eq!((&clock).now(), 50);
    }
}
