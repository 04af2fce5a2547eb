//! Pause/resume timers over the shared clock.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::clock::{SharedClock, SubscriptionId};

/// One delivered timer frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimerTick {
    /// Clock timestamp in milliseconds.
    pub timestamp: f64,
    /// Milliseconds since the previous frame received by *this* timer;
    /// `0.0` on the first frame after creation or a resume.
    pub dt: f64,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TimerOptions {
    /// Start ticking immediately instead of waiting for `resume()`.
    pub immediate: bool,
}

struct TimerState {
    last: Option<f64>,
}

/// A logical timer sharing the underlying clock loop with every other timer.
///
/// Pausing releases the clock subscription; resuming re-subscribes and resets
/// delta-time accounting so the first frame after a resume reports `dt == 0`.
pub struct FrameTimer {
    clock: SharedClock,
    state: Rc<RefCell<TimerState>>,
    callback: Rc<RefCell<dyn FnMut(TimerTick)>>,
    sub: Cell<Option<SubscriptionId>>,
}

impl FrameTimer {
    pub fn new(
        clock: &SharedClock,
        callback: impl FnMut(TimerTick) + 'static,
        options: TimerOptions,
    ) -> Self {
        let callback: Rc<RefCell<dyn FnMut(TimerTick)>> = Rc::new(RefCell::new(callback));
        let timer = Self {
            clock: clock.clone(),
            state: Rc::new(RefCell::new(TimerState { last: None })),
            callback,
            sub: Cell::new(None),
        };
        if options.immediate {
            timer.resume();
        }
        timer
    }

    pub fn is_running(&self) -> bool {
        self.sub.get().is_some()
    }

    pub fn resume(&self) {
        if self.sub.get().is_some() {
            return;
        }
        self.state.borrow_mut().last = None;
        let state = Rc::clone(&self.state);
        let callback = Rc::clone(&self.callback);
        let id = self.clock.subscribe(move |timestamp| {
            let dt = {
                let mut s = state.borrow_mut();
                let dt = s.last.map(|prev| timestamp - prev).unwrap_or(0.0);
                s.last = Some(timestamp);
                dt
            };
            (&mut *callback.borrow_mut())(TimerTick { timestamp, dt });
        });
        self.sub.set(Some(id));
    }

    pub fn pause(&self) {
        if let Some(id) = self.sub.take() {
            self.clock.unsubscribe(id);
        }
    }
}

impl Drop for FrameTimer {
    fn drop(&mut self) {
        self.pause();
    }
}
