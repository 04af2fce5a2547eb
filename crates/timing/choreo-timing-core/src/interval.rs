//! Fixed-interval fallback for hosts without a native per-frame primitive.

use std::thread;
use std::time::{Duration, Instant};

use choreo_api_core::FrameScheduler;

use crate::clock::SharedClock;

/// Frame period of the fallback driver, roughly one 60 Hz frame.
pub const FALLBACK_FRAME_MS: u64 = 16;

/// Demand-only scheduler: it tracks request/cancel bookkeeping but delivery
/// is driven externally (by an [`IntervalDriver`] or by tests).
#[derive(Default)]
pub struct ManualScheduler {
    next: u64,
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    fn cancel_frame(&mut self, _handle: u64) {}
}

/// Delivers clock ticks on a fixed ~16 ms cadence with `Instant`-derived
/// timestamps. Coarser granularity, same contract as a native scheduler.
pub struct IntervalDriver {
    clock: SharedClock,
    period: Duration,
    origin: Instant,
}

impl IntervalDriver {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            period: Duration::from_millis(FALLBACK_FRAME_MS),
            origin: Instant::now(),
        }
    }

    pub fn with_period(clock: SharedClock, period: Duration) -> Self {
        Self {
            clock,
            period,
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    /// Deliver one tick immediately.
    pub fn tick_once(&self) {
        self.clock.tick(self.now_ms());
    }

    /// Sleep one period, then deliver a tick. Returns false once the clock
    /// has no subscribers left (idle loops should stop pumping).
    pub fn pump(&self) -> bool {
        if !self.clock.has_subscribers() {
            return false;
        }
        thread::sleep(self.period);
        self.tick_once();
        self.clock.has_subscribers()
    }

    /// Pump until the clock goes idle or `max_frames` ticks were delivered.
    pub fn run(&self, max_frames: usize) {
        for _ in 0..max_frames {
            if !self.pump() {
                break;
            }
        }
    }
}
