//! Stagger sequencer: delay-ordered activation of a list of targets.
//!
//! Delays come from an ordering policy (from the first element, the last, or
//! the center) or from 2-D grid geometry (Euclidean distance from the grid
//! center, Manhattan distance from an edge). The run itself is a state
//! machine over the shared clock: it activates every target whose delay has
//! elapsed, excludes paused time from the elapsed counter, and unsubscribes
//! itself once everything has fired.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use choreo_api_core::EffectHandle;
use serde::{Deserialize, Serialize};

use crate::clock::{SharedClock, SubscriptionId};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaggerOrigin {
    #[default]
    First,
    Last,
    Center,
}

/// How grid distance is measured.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridMetric {
    /// Euclidean distance from the grid center.
    #[default]
    Center,
    /// Manhattan distance from the origin-selected edge corner.
    Edge,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridSpec {
    pub cols: usize,
    pub rows: usize,
    #[serde(default)]
    pub metric: GridMetric,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StaggerSpec {
    /// Delay between successive activation ranks, in milliseconds.
    pub step_ms: f64,
    pub origin: StaggerOrigin,
    pub grid: Option<GridSpec>,
    pub repeat: bool,
    pub repeat_delay_ms: f64,
}

impl Default for StaggerSpec {
    fn default() -> Self {
        Self {
            step_ms: 0.0,
            origin: StaggerOrigin::First,
            grid: None,
            repeat: false,
            repeat_delay_ms: 0.0,
        }
    }
}

/// Per-target activation delays for `count` targets under `spec`.
pub fn compute_delays(count: usize, spec: &StaggerSpec) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    match &spec.grid {
        Some(grid) => grid_delays(count, spec, grid),
        None => linear_delays(count, spec),
    }
}

fn linear_delays(count: usize, spec: &StaggerSpec) -> Vec<f64> {
    let last = (count - 1) as f64;
    (0..count)
        .map(|i| {
            let rank = match spec.origin {
                StaggerOrigin::First => i as f64,
                StaggerOrigin::Last => last - i as f64,
                StaggerOrigin::Center => (i as f64 - last / 2.0).abs(),
            };
            rank * spec.step_ms
        })
        .collect()
}

fn grid_delays(count: usize, spec: &StaggerSpec, grid: &GridSpec) -> Vec<f64> {
    let cols = grid.cols.max(1);
    let rows = grid.rows.max(1);
    let cx = (cols - 1) as f64 / 2.0;
    let cy = (rows - 1) as f64 / 2.0;
    (0..count)
        .map(|i| {
            let x = (i % cols) as f64;
            let y = (i / cols) as f64;
            let dist = match grid.metric {
                GridMetric::Center => {
                    let (dx, dy) = (x - cx, y - cy);
                    (dx * dx + dy * dy).sqrt()
                }
                GridMetric::Edge => match spec.origin {
                    StaggerOrigin::First => x + y,
                    StaggerOrigin::Last => ((cols - 1) as f64 - x) + ((rows - 1) as f64 - y),
                    StaggerOrigin::Center => (x - cx).abs() + (y - cy).abs(),
                },
            };
            dist * spec.step_ms
        })
        .collect()
}

type TriggerFn = Box<dyn FnMut(usize) -> Option<Box<dyn EffectHandle>>>;

struct StaggerInner {
    spec: StaggerSpec,
    delays: Vec<f64>,
    /// `None` only while the trigger is checked out for invocation.
    trigger: Option<TriggerFn>,
    activated: Vec<bool>,
    remaining: usize,
    /// Clock timestamp corresponding to elapsed == 0; cleared on pause so the
    /// next tick rebases from `carried`.
    base: Option<f64>,
    carried: f64,
    last_elapsed: f64,
    sub: Option<SubscriptionId>,
    effects: Vec<Box<dyn EffectHandle>>,
    running: bool,
    paused: bool,
    /// Bumped by stop/restart so effects produced by a superseded trigger get
    /// cancelled instead of stored.
    epoch: u64,
    /// Quiet-delay deadline between repeat cycles, in run time (elapsed
    /// milliseconds), so paused wall time never counts against it.
    resume_at: Option<f64>,
}

/// One sequencing run over `count` targets.
pub struct StaggerRun {
    clock: SharedClock,
    inner: Rc<RefCell<StaggerInner>>,
}

impl StaggerRun {
    pub fn new(
        clock: &SharedClock,
        count: usize,
        spec: StaggerSpec,
        trigger: impl FnMut(usize) -> Option<Box<dyn EffectHandle>> + 'static,
    ) -> Self {
        let delays = compute_delays(count, &spec);
        Self {
            clock: clock.clone(),
            inner: Rc::new(RefCell::new(StaggerInner {
                spec,
                activated: vec![false; delays.len()],
                remaining: delays.len(),
                delays,
                trigger: Some(Box::new(trigger)),
                base: None,
                carried: 0.0,
                last_elapsed: 0.0,
                sub: None,
                effects: Vec::new(),
                running: false,
                paused: false,
                epoch: 0,
                resume_at: None,
            })),
        }
    }

    pub fn delays(&self) -> Vec<f64> {
        self.inner.borrow().delays.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    pub fn is_paused(&self) -> bool {
        self.inner.borrow().paused
    }

    pub fn activated_count(&self) -> usize {
        let st = self.inner.borrow();
        st.delays.len() - st.remaining
    }

    /// (Re)trigger the run. A run already in flight is cancelled first:
    /// in-flight effects are dropped and activation bookkeeping restarts from
    /// zero.
    pub fn start(&self) {
        self.stop();
        {
            let mut st = self.inner.borrow_mut();
            st.running = true;
        }
        self.ensure_subscribed();
    }

    pub fn pause(&self) {
        let unsub = {
            let mut st = self.inner.borrow_mut();
            if !st.running || st.paused {
                None
            } else {
                st.paused = true;
                st.carried = st.last_elapsed;
                st.base = None;
                st.sub.take()
            }
        };
        if let Some(id) = unsub {
            self.clock.unsubscribe(id);
        }
    }

    pub fn resume(&self) {
        let resubscribe = {
            let mut st = self.inner.borrow_mut();
            if st.running && st.paused {
                st.paused = false;
                true
            } else {
                false
            }
        };
        if resubscribe {
            self.ensure_subscribed();
        }
    }

    /// Cancel in-flight effects and clear all activation state.
    pub fn stop(&self) {
        let (unsub, mut effects) = {
            let mut st = self.inner.borrow_mut();
            st.epoch += 1;
            st.running = false;
            st.paused = false;
            st.resume_at = None;
            for a in st.activated.iter_mut() {
                *a = false;
            }
            st.remaining = st.delays.len();
            st.carried = 0.0;
            st.last_elapsed = 0.0;
            st.base = None;
            (st.sub.take(), mem::take(&mut st.effects))
        };
        for handle in effects.iter_mut() {
            handle.cancel();
        }
        if let Some(id) = unsub {
            self.clock.unsubscribe(id);
        }
    }

    /// Degraded-capability path: activate everything synchronously and jump
    /// every effect to its end state.
    pub fn finish_now(&self) {
        let (unsub, mut effects, pending) = {
            let mut st = self.inner.borrow_mut();
            st.epoch += 1;
            st.running = false;
            st.paused = false;
            st.resume_at = None;
            let pending: Vec<usize> = (0..st.delays.len()).filter(|i| !st.activated[*i]).collect();
            for a in st.activated.iter_mut() {
                *a = true;
            }
            st.remaining = 0;
            (st.sub.take(), mem::take(&mut st.effects), pending)
        };
        for handle in effects.iter_mut() {
            handle.finish();
        }
        if let Some(id) = unsub {
            self.clock.unsubscribe(id);
        }
        let trigger = self.inner.borrow_mut().trigger.take();
        if let Some(mut trigger) = trigger {
            for i in pending {
                if let Some(mut handle) = trigger(i) {
                    handle.finish();
                }
            }
            let mut st = self.inner.borrow_mut();
            if st.trigger.is_none() {
                st.trigger = Some(trigger);
            }
        }
    }

    fn ensure_subscribed(&self) {
        if self.inner.borrow().sub.is_some() {
            return;
        }
        let inner = Rc::clone(&self.inner);
        let clock = self.clock.clone();
        let id = self.clock.subscribe(move |ts| Self::on_tick(&clock, &inner, ts));
        self.inner.borrow_mut().sub = Some(id);
    }

    fn on_tick(clock: &SharedClock, inner: &Rc<RefCell<StaggerInner>>, ts: f64) {
        // Phase 1: advance bookkeeping under the borrow.
        let (due, epoch) = {
            let mut st = inner.borrow_mut();
            if !st.running || st.paused {
                return;
            }
            let carried = st.carried;
            let mut elapsed = ts - *st.base.get_or_insert(ts - carried);
            st.last_elapsed = elapsed;
            if let Some(deadline) = st.resume_at {
                if elapsed < deadline {
                    return;
                }
                st.resume_at = None;
                for a in st.activated.iter_mut() {
                    *a = false;
                }
                st.remaining = st.delays.len();
                st.carried = 0.0;
                st.base = Some(ts);
                st.last_elapsed = 0.0;
                elapsed = 0.0;
            }
            let mut due = Vec::new();
            for i in 0..st.delays.len() {
                if !st.activated[i] && st.delays[i] <= elapsed {
                    st.activated[i] = true;
                    st.remaining -= 1;
                    due.push(i);
                }
            }
            (due, st.epoch)
        };

        // Phase 2: fire triggers outside the borrow; the trigger may
        // reentrantly stop or restart the run.
        if !due.is_empty() {
            let trigger = inner.borrow_mut().trigger.take();
            if let Some(mut trigger) = trigger {
                let mut handles = Vec::new();
                for i in due {
                    if let Some(handle) = trigger(i) {
                        handles.push(handle);
                    }
                }
                let mut st = inner.borrow_mut();
                if st.trigger.is_none() {
                    st.trigger = Some(trigger);
                }
                if st.epoch == epoch {
                    st.effects.extend(handles);
                } else {
                    // A stop superseded this tick mid-flight.
                    for mut handle in handles {
                        handle.cancel();
                    }
                }
            }
        }

        // Phase 3: completion — self-unsubscribe, or arm the repeat delay.
        let unsub = {
            let mut st = inner.borrow_mut();
            if st.epoch != epoch || !st.running || st.remaining > 0 || st.resume_at.is_some() {
                None
            } else if st.spec.repeat {
                st.resume_at = Some(st.last_elapsed + st.spec.repeat_delay_ms);
                None
            } else {
                st.running = false;
                st.base = None;
                st.carried = 0.0;
                st.sub.take()
            }
        };
        if let Some(id) = unsub {
            clock.unsubscribe(id);
        }
    }
}

impl Drop for StaggerRun {
    fn drop(&mut self) {
        self.stop();
    }
}
