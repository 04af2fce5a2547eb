//! Multi-phase timeline sequencer.
//!
//! Named phases share one cycle window; each phase has its own start offset
//! and duration. The run activates phases idempotently, reports progress in
//! bounded steps, and either loops (optionally after a quiet delay) or halts
//! when the cycle completes.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use choreo_api_core::EffectHandle;
use serde::{Deserialize, Serialize};

use crate::clock::{SharedClock, SubscriptionId};

/// Minimum progress movement before a phase or cycle progress callback is
/// re-reported; bounds callback frequency to ~100 reports per phase.
pub const PROGRESS_STEP: f64 = 0.01;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    #[serde(default)]
    pub start_ms: f64,
    #[serde(default)]
    pub duration_ms: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSpec {
    pub phases: Vec<PhaseSpec>,
    /// Cycle window length; defaults to the latest phase end.
    pub cycle_ms: Option<f64>,
    pub looping: bool,
    pub loop_delay_ms: f64,
}

impl TimelineSpec {
    pub fn cycle_len(&self) -> f64 {
        self.cycle_ms.unwrap_or_else(|| {
            self.phases
                .iter()
                .map(|p| p.start_ms + p.duration_ms)
                .fold(0.0, f64::max)
        })
    }
}

/// Receiver for timeline events. Callbacks run outside the run's internal
/// borrow, so a delegate may reenter the run (stop it, restart it).
pub trait TimelineDelegate {
    /// Fired once per phase per cycle. May hand back an effect handle the run
    /// will cancel on stop or finish on the degraded path.
    fn phase_started(&mut self, phase: &PhaseSpec, cycle: u64) -> Option<Box<dyn EffectHandle>> {
        let _ = (phase, cycle);
        None
    }
    fn phase_progress(&mut self, phase: &PhaseSpec, progress: f64) {
        let _ = (phase, progress);
    }
    fn phase_completed(&mut self, phase: &PhaseSpec) {
        let _ = phase;
    }
    fn cycle_progress(&mut self, progress: f64) {
        let _ = progress;
    }
    fn cycle_completed(&mut self, cycle: u64) {
        let _ = cycle;
    }
    /// Fired when a non-looping timeline runs out; the session-side delegate
    /// uses this to clear the playing flag.
    fn halted(&mut self) {}
}

impl<T: TimelineDelegate + ?Sized> TimelineDelegate for Box<T> {
    fn phase_started(&mut self, phase: &PhaseSpec, cycle: u64) -> Option<Box<dyn EffectHandle>> {
        (**self).phase_started(phase, cycle)
    }
    fn phase_progress(&mut self, phase: &PhaseSpec, progress: f64) {
        (**self).phase_progress(phase, progress)
    }
    fn phase_completed(&mut self, phase: &PhaseSpec) {
        (**self).phase_completed(phase)
    }
    fn cycle_progress(&mut self, progress: f64) {
        (**self).cycle_progress(progress)
    }
    fn cycle_completed(&mut self, cycle: u64) {
        (**self).cycle_completed(cycle)
    }
    fn halted(&mut self) {
        (**self).halted()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct PhaseState {
    started: bool,
    completed: bool,
    last_progress: f64,
}

/// Discrete events gathered under the state borrow, dispatched outside it.
enum Ev {
    Cycle(f64),
    Start(usize, u64),
    Progress(usize, f64),
    Done(usize),
    CycleDone(u64),
    Halted,
}

struct TimelineInner {
    spec: TimelineSpec,
    phases: Rc<Vec<PhaseSpec>>,
    states: Vec<PhaseState>,
    cycle_len: f64,
    delegate: Option<Box<dyn TimelineDelegate>>,
    effects: Vec<Box<dyn EffectHandle>>,
    cycle: u64,
    last_cycle_progress: f64,
    base: Option<f64>,
    carried: f64,
    last_elapsed: f64,
    sub: Option<SubscriptionId>,
    running: bool,
    paused: bool,
    epoch: u64,
    /// Quiet-delay deadline between loop cycles, in run time (elapsed
    /// milliseconds), so paused wall time never counts against it.
    resume_at: Option<f64>,
}

impl TimelineInner {
    /// Reset per-phase state for a fresh cycle; returns the effects that were
    /// still tracked so the caller can cancel them outside the borrow.
    fn reset_cycle(&mut self) -> Vec<Box<dyn EffectHandle>> {
        for s in self.states.iter_mut() {
            *s = PhaseState::default();
        }
        self.last_cycle_progress = 0.0;
        mem::take(&mut self.effects)
    }
}

pub struct TimelineRun {
    clock: SharedClock,
    inner: Rc<RefCell<TimelineInner>>,
}

impl TimelineRun {
    pub fn new(clock: &SharedClock, spec: TimelineSpec, delegate: impl TimelineDelegate + 'static) -> Self {
        let cycle_len = spec.cycle_len();
        let phases = Rc::new(spec.phases.clone());
        let states = vec![PhaseState::default(); phases.len()];
        Self {
            clock: clock.clone(),
            inner: Rc::new(RefCell::new(TimelineInner {
                spec,
                phases,
                states,
                cycle_len,
                delegate: Some(Box::new(delegate)),
                effects: Vec::new(),
                cycle: 0,
                last_cycle_progress: 0.0,
                base: None,
                carried: 0.0,
                last_elapsed: 0.0,
                sub: None,
                running: false,
                paused: false,
                epoch: 0,
                resume_at: None,
            })),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    pub fn is_paused(&self) -> bool {
        self.inner.borrow().paused
    }

    pub fn cycle(&self) -> u64 {
        self.inner.borrow().cycle
    }

    pub fn progress(&self) -> f64 {
        self.inner.borrow().last_cycle_progress
    }

    /// (Re)start from cycle zero.
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

    pub fn stop(&self) {
        let (unsub, mut effects) = {
            let mut st = self.inner.borrow_mut();
            st.epoch += 1;
            st.running = false;
            st.paused = false;
            st.resume_at = None;
            st.cycle = 0;
            st.carried = 0.0;
            st.last_elapsed = 0.0;
            st.base = None;
            let effects = st.reset_cycle();
            (st.sub.take(), effects)
        };
        for handle in effects.iter_mut() {
            handle.cancel();
        }
        if let Some(id) = unsub {
            self.clock.unsubscribe(id);
        }
    }

    /// Degraded-capability path: drive every phase to its end state and halt,
    /// all synchronously.
    pub fn finish_now(&self) {
        let (unsub, mut effects, pending, cycle) = {
            let mut st = self.inner.borrow_mut();
            st.epoch += 1;
            st.running = false;
            st.paused = false;
            st.resume_at = None;
            let pending: Vec<(usize, bool)> = st
                .states
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.completed)
                .map(|(i, s)| (i, s.started))
                .collect();
            for s in st.states.iter_mut() {
                s.started = true;
                s.completed = true;
                s.last_progress = 1.0;
            }
            st.last_cycle_progress = 1.0;
            (
                st.sub.take(),
                mem::take(&mut st.effects),
                pending,
                st.cycle,
            )
        };
        for handle in effects.iter_mut() {
            handle.finish();
        }
        if let Some(id) = unsub {
            self.clock.unsubscribe(id);
        }
        let (delegate, phases) = {
            let mut st = self.inner.borrow_mut();
            (st.delegate.take(), Rc::clone(&st.phases))
        };
        if let Some(mut delegate) = delegate {
            for (i, already_started) in pending {
                if !already_started {
                    if let Some(mut handle) = delegate.phase_started(&phases[i], cycle) {
                        handle.finish();
                    }
                }
                delegate.phase_progress(&phases[i], 1.0);
                delegate.phase_completed(&phases[i]);
            }
            delegate.cycle_progress(1.0);
            delegate.cycle_completed(cycle);
            delegate.halted();
            let mut st = self.inner.borrow_mut();
            if st.delegate.is_none() {
                st.delegate = Some(delegate);
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

    fn on_tick(clock: &SharedClock, inner: &Rc<RefCell<TimelineInner>>, ts: f64) {
        // Phase 1: advance the state machine under the borrow, recording
        // events and effects that need handling outside it.
        let (events, mut stale, epoch, phases) = {
            let mut st = inner.borrow_mut();
            if !st.running || st.paused {
                return;
            }
            let mut events: Vec<Ev> = Vec::new();
            let mut stale: Vec<Box<dyn EffectHandle>> = Vec::new();
            let carried = st.carried;
            let mut elapsed = ts - *st.base.get_or_insert(ts - carried);
            st.last_elapsed = elapsed;
            if let Some(deadline) = st.resume_at {
                if elapsed < deadline {
                    return;
                }
                st.resume_at = None;
                stale = st.reset_cycle();
                st.cycle += 1;
                st.carried = 0.0;
                st.base = Some(ts);
                st.last_elapsed = 0.0;
                elapsed = 0.0;
            }
            let cycle_len = st.cycle_len.max(f64::EPSILON);
            let cp = (elapsed / cycle_len).clamp(0.0, 1.0);
            if cp - st.last_cycle_progress > PROGRESS_STEP
                || (cp >= 1.0 && st.last_cycle_progress < 1.0)
            {
                st.last_cycle_progress = cp;
                events.push(Ev::Cycle(cp));
            }

            let cycle = st.cycle;
            for i in 0..st.states.len() {
                let start = st.spec.phases[i].start_ms;
                let duration = st.spec.phases[i].duration_ms;
                let state = &mut st.states[i];
                if !state.started && elapsed >= start {
                    state.started = true;
                    events.push(Ev::Start(i, cycle));
                }
                if state.started && !state.completed {
                    let local = elapsed - start;
                    let p = if duration <= 0.0 {
                        1.0
                    } else {
                        (local / duration).clamp(0.0, 1.0)
                    };
                    if p - state.last_progress > PROGRESS_STEP
                        || (p >= 1.0 && state.last_progress < 1.0)
                    {
                        state.last_progress = p;
                        events.push(Ev::Progress(i, p));
                    }
                    if local >= duration {
                        state.completed = true;
                        events.push(Ev::Done(i));
                    }
                }
            }

            let all_done = !st.states.is_empty() && st.states.iter().all(|s| s.completed);
            if elapsed >= cycle_len || all_done {
                events.push(Ev::CycleDone(st.cycle));
                if st.spec.looping {
                    if st.spec.loop_delay_ms > 0.0 {
                        st.resume_at = Some(st.last_elapsed + st.spec.loop_delay_ms);
                    } else {
                        stale.extend(st.reset_cycle());
                        st.cycle += 1;
                        st.carried = 0.0;
                        st.base = Some(ts);
                        st.last_elapsed = 0.0;
                    }
                } else {
                    st.running = false;
                    events.push(Ev::Halted);
                }
            }
            (events, stale, st.epoch, Rc::clone(&st.phases))
        };

        for handle in stale.iter_mut() {
            handle.cancel();
        }
        if events.is_empty() {
            return;
        }

        // Phase 2: dispatch to the delegate outside the borrow.
        let delegate = inner.borrow_mut().delegate.take();
        let mut handles: Vec<Box<dyn EffectHandle>> = Vec::new();
        let mut halted = false;
        if let Some(mut delegate) = delegate {
            for ev in events {
                match ev {
                    Ev::Cycle(p) => delegate.cycle_progress(p),
                    Ev::Start(i, cycle) => {
                        if let Some(handle) = delegate.phase_started(&phases[i], cycle) {
                            handles.push(handle);
                        }
                    }
                    Ev::Progress(i, p) => delegate.phase_progress(&phases[i], p),
                    Ev::Done(i) => delegate.phase_completed(&phases[i]),
                    Ev::CycleDone(cycle) => delegate.cycle_completed(cycle),
                    Ev::Halted => {
                        halted = true;
                        delegate.halted();
                    }
                }
            }
            let mut st = inner.borrow_mut();
            if st.delegate.is_none() {
                st.delegate = Some(delegate);
            }
        }

        // Phase 3: store or discard produced effects, then self-unsubscribe
        // on halt.
        let unsub = {
            let mut st = inner.borrow_mut();
            if st.epoch == epoch {
                st.effects.extend(handles);
            } else {
                for mut handle in handles {
                    handle.cancel();
                }
            }
            if halted && st.epoch == epoch {
                st.sub.take()
            } else {
                None
            }
        };
        if let Some(id) = unsub {
            clock.unsubscribe(id);
        }
    }
}

impl Drop for TimelineRun {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_len_defaults_to_latest_phase_end() {
        let spec = TimelineSpec {
            phases: vec![
                PhaseSpec {
                    name: "a".into(),
                    start_ms: 0.0,
                    duration_ms: 300.0,
                },
                PhaseSpec {
                    name: "b".into(),
                    start_ms: 200.0,
                    duration_ms: 500.0,
                },
            ],
            ..TimelineSpec::default()
        };
        assert_eq!(spec.cycle_len(), 700.0);
        let explicit = TimelineSpec {
            cycle_ms: Some(1000.0),
            ..spec
        };
        assert_eq!(explicit.cycle_len(), 1000.0);
    }
}
