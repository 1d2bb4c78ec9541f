//! Time and tick scheduling.
//!
//! The loop never calls `Instant::now()` or `sleep` directly. It asks a
//! `Clock` for the time and a `TickSource` for permission to run the next
//! tick, so tests and the simulator can drive an exact number of ticks
//! against a manually advanced clock.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Gate in front of every tick.
pub trait TickSource: Send {
    /// Wait until the next tick is due. Returns `false` when the loop should
    /// end, either because `running` was cleared or the source is exhausted.
    fn next_tick(&mut self, running: &AtomicBool) -> bool;
}

/// Fixed-rate ticker: at most one tick per `interval`, measured start to
/// start so processing time is absorbed into the wait.
#[derive(Debug, Clone)]
pub struct IntervalTicker {
    interval: Duration,
    last: Option<Instant>,
}

/// Upper bound on a single sleep, so a stop request is noticed promptly.
const STOP_POLL: Duration = Duration::from_millis(20);

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }
}

impl TickSource for IntervalTicker {
    fn next_tick(&mut self, running: &AtomicBool) -> bool {
        if let Some(last) = self.last {
            let due = last + self.interval;
            loop {
                if !running.load(Ordering::Relaxed) {
                    return false;
                }
                let now = Instant::now();
                if now >= due {
                    break;
                }
                std::thread::sleep((due - now).min(STOP_POLL));
            }
        }
        self.last = Some(Instant::now());
        running.load(Ordering::Relaxed)
    }
}

/// Exactly `n` ticks with no waiting, optionally advancing a `ManualClock`
/// by `step` before each one.
#[derive(Debug, Clone)]
pub struct FixedTicks {
    remaining: usize,
    clock: Option<(ManualClock, Duration)>,
}

impl FixedTicks {
    pub fn new(n: usize) -> Self {
        Self {
            remaining: n,
            clock: None,
        }
    }

    pub fn advancing(mut self, clock: ManualClock, step: Duration) -> Self {
        self.clock = Some((clock, step));
        self
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl TickSource for FixedTicks {
    fn next_tick(&mut self, running: &AtomicBool) -> bool {
        if self.remaining == 0 || !running.load(Ordering::Relaxed) {
            return false;
        }
        self.remaining -= 1;
        if let Some((clock, step)) = &self.clock {
            clock.advance(*step);
        }
        true
    }
}
