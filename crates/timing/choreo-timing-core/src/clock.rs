//! Coalesced per-frame clock.
//!
//! Many logical subscribers share one underlying frame request. While at
//! least one subscriber exists exactly one request is outstanding against the
//! host scheduler; the moment the count reaches zero the request is cancelled,
//! and a later subscription restarts the loop.

use std::cell::RefCell;
use std::rc::Rc;

use choreo_api_core::FrameScheduler;
use indexmap::IndexMap;

/// Token identifying one clock subscription.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type FrameCallback = Box<dyn FnMut(f64)>;

struct ClockInner {
    scheduler: Box<dyn FrameScheduler>,
    /// `None` in a slot marks a callback checked out for invocation.
    subscribers: IndexMap<u64, Option<FrameCallback>>,
    next_id: u64,
    pending: Option<u64>,
}

impl ClockInner {
    fn request_if_needed(&mut self) {
        if self.pending.is_none() && !self.subscribers.is_empty() {
            self.pending = Some(self.scheduler.request_frame());
        }
    }

    fn cancel_if_idle(&mut self) {
        if self.subscribers.is_empty() {
            if let Some(handle) = self.pending.take() {
                self.scheduler.cancel_frame(handle);
            }
        }
    }
}

/// Cheap-clone handle to the process-wide frame clock.
#[derive(Clone)]
pub struct SharedClock {
    inner: Rc<RefCell<ClockInner>>,
}

impl SharedClock {
    pub fn new(scheduler: Box<dyn FrameScheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ClockInner {
                scheduler,
                subscribers: IndexMap::new(),
                next_id: 0,
                pending: None,
            })),
        }
    }

    /// Register a per-frame callback. A subscriber added while a tick is in
    /// flight is not invoked until the next tick.
    pub fn subscribe(&self, callback: impl FnMut(f64) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, Some(Box::new(callback)));
        inner.request_if_needed();
        SubscriptionId(id)
    }

    /// Remove a subscription. A subscriber removed mid-tick is not invoked
    /// again within that tick. Unknown tokens are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.borrow_mut();
        inner.subscribers.shift_remove(&id.0);
        inner.cancel_if_idle();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Deliver one frame. Every subscriber present at the start of the tick
    /// observes the same `timestamp` (milliseconds, monotonically
    /// non-decreasing across ticks). Callbacks may reentrantly subscribe or
    /// unsubscribe, including removing themselves.
    pub fn tick(&self, timestamp: f64) {
        let ids: Vec<u64> = {
            let mut inner = self.inner.borrow_mut();
            // The outstanding request is the one being delivered right now.
            inner.pending = None;
            inner.subscribers.keys().copied().collect()
        };

        for id in ids {
            // Check the callback out of its slot so the subscriber map stays
            // borrowable during the call.
            let taken = {
                let mut inner = self.inner.borrow_mut();
                match inner.subscribers.get_mut(&id) {
                    Some(slot) => slot.take(),
                    None => None,
                }
            };
            if let Some(mut callback) = taken {
                callback(timestamp);
                let mut inner = self.inner.borrow_mut();
                if let Some(slot) = inner.subscribers.get_mut(&id) {
                    // The slot survives only if the callback was not
                    // unsubscribed (and re-created) during its own run.
                    if slot.is_none() {
                        *slot = Some(callback);
                    }
                }
            }
        }

        let mut inner = self.inner.borrow_mut();
        inner.request_if_needed();
    }
}
