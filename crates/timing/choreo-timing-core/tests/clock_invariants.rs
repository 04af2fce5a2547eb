use std::cell::Cell;
use std::rc::Rc;

use choreo_api_core::FrameScheduler;
use choreo_timing::{FrameTimer, SharedClock, TimerOptions};

/// Fake scheduler counting demand, so tests can assert the coalescing
/// invariant without any host loop.
struct CountingScheduler {
    requests: Rc<Cell<u32>>,
    cancels: Rc<Cell<u32>>,
    next: u64,
}

impl FrameScheduler for CountingScheduler {
    fn request_frame(&mut self) -> u64 {
        self.requests.set(self.requests.get() + 1);
        self.next += 1;
        self.next
    }
    fn cancel_frame(&mut self, _handle: u64) {
        self.cancels.set(self.cancels.get() + 1);
    }
}

fn counting_clock() -> (SharedClock, Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let requests = Rc::new(Cell::new(0));
    let cancels = Rc::new(Cell::new(0));
    let clock = SharedClock::new(Box::new(CountingScheduler {
        requests: Rc::clone(&requests),
        cancels: Rc::clone(&cancels),
        next: 0,
    }));
    (clock, requests, cancels)
}

/// it should keep exactly one frame request outstanding for N subscribers
#[test]
fn n_subscribers_share_one_frame_request() {
    let (clock, requests, _cancels) = counting_clock();
    let subs: Vec<_> = (0..5).map(|_| clock.subscribe(|_| {})).collect();
    assert_eq!(requests.get(), 1, "only the first subscription requests");
    assert_eq!(clock.subscriber_count(), 5);
    for id in subs {
        clock.unsubscribe(id);
    }
    assert_eq!(clock.subscriber_count(), 0);
}

/// it should cancel the outstanding request when the last subscriber leaves
/// and restart the loop on re-subscription
#[test]
fn last_unsubscribe_cancels_and_resubscribe_restarts() {
    let (clock, requests, cancels) = counting_clock();
    let id = clock.subscribe(|_| {});
    assert_eq!((requests.get(), cancels.get()), (1, 0));
    clock.unsubscribe(id);
    assert_eq!(cancels.get(), 1, "idle clock must cancel its request");
    let _id2 = clock.subscribe(|_| {});
    assert_eq!(requests.get(), 2, "re-subscription restarts the loop");
}

/// it should re-request one frame after each delivered tick while busy
#[test]
fn tick_rerequests_while_subscribers_remain() {
    let (clock, requests, _cancels) = counting_clock();
    clock.subscribe(|_| {});
    assert_eq!(requests.get(), 1);
    clock.tick(0.0);
    assert_eq!(requests.get(), 2);
    clock.tick(16.0);
    assert_eq!(requests.get(), 3);
}

/// it should not re-request once the only subscriber removed itself mid-tick
#[test]
fn no_idle_churn_after_self_removal() {
    let (clock, requests, _cancels) = counting_clock();
    let clock2 = clock.clone();
    let own = Rc::new(Cell::new(None));
    let own2 = Rc::clone(&own);
    let id = clock.subscribe(move |_| {
        if let Some(id) = own2.get() {
            clock2.unsubscribe(id);
        }
    });
    own.set(Some(id));
    clock.tick(0.0);
    assert_eq!(clock.subscriber_count(), 0);
    assert_eq!(requests.get(), 1, "empty clock must not re-request");
}

/// it should give each timer its own delta time, zero right after a resume
#[test]
fn timer_delta_time_resets_on_resume() {
    let (clock, _r, _c) = counting_clock();
    let deltas = Rc::new(std::cell::RefCell::new(Vec::new()));
    let d2 = Rc::clone(&deltas);
    let timer = FrameTimer::new(
        &clock,
        move |tick| d2.borrow_mut().push(tick.dt),
        TimerOptions { immediate: true },
    );
    clock.tick(100.0);
    clock.tick(116.0);
    timer.pause();
    clock.tick(132.0); // not received
    timer.resume();
    clock.tick(200.0);
    clock.tick(210.0);
    assert_eq!(*deltas.borrow(), vec![0.0, 16.0, 0.0, 10.0]);
}

/// it should pause and resume timers independently over one shared loop
#[test]
fn independent_timers_share_the_loop() {
    let (clock, requests, _c) = counting_clock();
    let a_count = Rc::new(Cell::new(0));
    let b_count = Rc::new(Cell::new(0));
    let (a2, b2) = (Rc::clone(&a_count), Rc::clone(&b_count));
    let timer_a = FrameTimer::new(&clock, move |_| a2.set(a2.get() + 1), TimerOptions { immediate: true });
    let _timer_b = FrameTimer::new(&clock, move |_| b2.set(b2.get() + 1), TimerOptions { immediate: true });
    assert_eq!(requests.get(), 1, "both timers ride one request");
    clock.tick(0.0);
    timer_a.pause();
    clock.tick(16.0);
    assert_eq!(a_count.get(), 1);
    assert_eq!(b_count.get(), 2);
    timer_a.resume();
    clock.tick(32.0);
    assert_eq!(a_count.get(), 2);
}
