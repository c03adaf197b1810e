#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Duration, Local, NaiveDateTime};

/// Source of the local wall-clock time stamped onto records.
pub trait WallClock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Deterministic clock that advances by `step_secs` on every read.
#[derive(Debug)]
pub struct SteppingClock {
    start: NaiveDateTime,
    step_secs: i64,
    reads: AtomicI64,
}

impl SteppingClock {
    pub fn new(start: NaiveDateTime, step_secs: i64) -> Self {
        Self {
            start,
            step_secs,
            reads: AtomicI64::new(0),
        }
    }
}

impl WallClock for SteppingClock {
    fn now(&self) -> NaiveDateTime {
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        self.start + Duration::seconds(n.saturating_mul(self.step_secs))
    }
}

impl<C: WallClock + ?Sized> WallClock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}
