//! End-to-end runs of the built-in stagger, timeline, and autoplay modules
//! inside a real session.

mod common;

use std::rc::Rc;

use serde_json::{json, Value as JsonValue};

use common::{clock, log, target, EffectFlags, FakeObserver, Log, RecordingEffect};
use choreo_api_core::{EnvSignals, OrchestrationConfig, TargetRef};
use choreo_orchestrator::{
    modules::timeline_keys, AutoplayModule, ModuleRegistry, Session, SessionBuilder, StaggerModule,
    TimelineModule,
};
use choreo_timing::SharedClock;

fn stagger_session(
    options: JsonValue,
    env: Option<EnvSignals>,
) -> (Session, SharedClock, Log, EffectFlags) {
    let fired = log();
    let flags = EffectFlags::default();
    let (sink, handles) = (fired.clone(), flags.clone());
    let mut registry = ModuleRegistry::new();
    registry
        .register(Rc::new(StaggerModule::new(move |i| {
            sink.borrow_mut().push(format!("fx:{i}"));
            Some(Box::new(RecordingEffect(handles.clone())))
        })))
        .unwrap();
    let clock = clock();
    let config = OrchestrationConfig::new(json!({ "stagger": options }));
    let mut builder = SessionBuilder::new(target(), config, clock.clone(), registry);
    if let Some(env) = env {
        builder = builder.env(env);
    }
    (builder.build().unwrap(), clock, fired, flags)
}

/// it should fire stagger effects in delay order and release the clock
#[test]
fn stagger_fires_effects_in_delay_order() {
    let (mut session, clock, fired, _) =
        stagger_session(json!({ "count": 3, "step_ms": 100.0 }), None);
    session.play();
    clock.tick(0.0);
    assert_eq!(*fired.borrow(), vec!["fx:0"]);
    clock.tick(100.0);
    clock.tick(200.0);
    assert_eq!(*fired.borrow(), vec!["fx:0", "fx:1", "fx:2"]);
    // The run released its clock slot on completion.
    assert!(!clock.has_subscribers());
}

/// it should exclude paused wall time from stagger delays
#[test]
fn stagger_pause_excludes_paused_time() {
    let (mut session, clock, fired, _) =
        stagger_session(json!({ "count": 2, "step_ms": 100.0 }), None);
    session.play();
    clock.tick(0.0);
    session.pause();
    session.resume();
    // 100ms of wall time passed while paused; the second target still needs
    // 100ms of *run* time.
    clock.tick(150.0);
    assert_eq!(*fired.borrow(), vec!["fx:0"]);
    clock.tick(250.0);
    assert_eq!(*fired.borrow(), vec!["fx:0", "fx:1"]);
}

/// it should cancel in-flight stagger effects on stop
#[test]
fn stagger_stop_cancels_in_flight_effects() {
    let (mut session, clock, fired, flags) =
        stagger_session(json!({ "count": 2, "step_ms": 100.0 }), None);
    session.play();
    clock.tick(0.0);
    assert_eq!(fired.borrow().len(), 1);
    session.stop();
    assert!(flags.cancelled.get());
}

/// it should finish everything synchronously in a degraded environment
#[test]
fn degraded_environment_finishes_staggers_synchronously() {
    let env = EnvSignals {
        can_animate: false,
        ..EnvSignals::default()
    };
    let (mut session, clock, fired, flags) =
        stagger_session(json!({ "count": 3, "step_ms": 100.0 }), Some(env));
    session.play();
    // No ticks: every index fired and every produced handle jumped to its
    // end state.
    assert_eq!(*fired.borrow(), vec!["fx:0", "fx:1", "fx:2"]);
    assert!(flags.finished.get());
    assert!(!clock.has_subscribers());
}

/// it should report delays and activation through the merged API
#[test]
fn stagger_api_reports_delays_and_activation() {
    let (mut session, clock, _, _) =
        stagger_session(json!({ "count": 3, "step_ms": 100.0 }), None);
    assert_eq!(
        session.call("stagger.delays", JsonValue::Null),
        Some(json!([0.0, 100.0, 200.0]))
    );
    session.play();
    clock.tick(0.0);
    clock.tick(100.0);
    assert_eq!(
        session.call("stagger.activated", JsonValue::Null),
        Some(json!(2))
    );
}

fn timeline_session(options: JsonValue) -> (Session, SharedClock) {
    let mut registry = ModuleRegistry::new();
    registry.register(Rc::new(TimelineModule::new())).unwrap();
    let clock = clock();
    let config = OrchestrationConfig::new(json!({ "timeline": options }));
    let session = SessionBuilder::new(target(), config, clock.clone(), registry)
        .build()
        .unwrap();
    (session, clock)
}

/// it should mirror timeline state into the exchange and halt cleanly
#[test]
fn timeline_mirrors_state_into_the_exchange_and_halts() {
    let (mut session, clock) = timeline_session(json!({
        "phases": [
            { "name": "intro", "start_ms": 0.0, "duration_ms": 100.0 },
            { "name": "outro", "start_ms": 100.0, "duration_ms": 100.0 },
        ],
    }));
    session.play();
    let ctx = session.context().clone();

    clock.tick(0.0);
    assert_eq!(
        ctx.get(timeline_keys::PHASE).unwrap().as_json(),
        Some(&json!("intro"))
    );

    clock.tick(150.0);
    assert_eq!(
        ctx.get(timeline_keys::PHASE).unwrap().as_json(),
        Some(&json!("outro"))
    );

    clock.tick(200.0);
    assert_eq!(
        ctx.get(timeline_keys::CYCLE_PROGRESS).unwrap().as_json(),
        Some(&json!(1.0))
    );
    // Natural halt clears the playing flag and releases the clock.
    assert!(!session.is_playing());
    assert!(!clock.has_subscribers());
}

/// it should report cycle and progress through the merged API
#[test]
fn timeline_api_reports_cycle_and_progress() {
    let (mut session, clock) = timeline_session(json!({
        "phases": [{ "name": "intro", "start_ms": 0.0, "duration_ms": 200.0 }],
        "looping": true,
    }));
    session.play();
    clock.tick(0.0);
    clock.tick(100.0);
    assert_eq!(
        session.call("timeline.progress", JsonValue::Null),
        Some(json!(0.5))
    );
    clock.tick(200.0);
    clock.tick(210.0);
    assert_eq!(
        session.call("timeline.cycle", JsonValue::Null),
        Some(json!(1))
    );
    assert!(session.is_playing());
}

fn autoplay_session(options: JsonValue) -> (Session, Rc<FakeObserver>) {
    let observer = Rc::new(FakeObserver::default());
    let mut registry = ModuleRegistry::new();
    registry
        .register(Rc::new(AutoplayModule::new(
            Rc::clone(&observer) as Rc<dyn choreo_api_core::VisibilityObserver>
        )))
        .unwrap();
    let config = OrchestrationConfig::new(json!({ "autoplay": options }));
    let session = SessionBuilder::new(TargetRef::new("hero"), config, clock(), registry)
        .build()
        .unwrap();
    (session, observer)
}

/// it should translate visibility changes into automatic play/stop
#[test]
fn visibility_drives_auto_play_and_stop() {
    let (mut session, observer) = autoplay_session(json!({ "threshold": 0.5 }));
    assert_eq!(*observer.thresholds.borrow(), vec![0.5]);

    observer.emit(true, 0.6);
    session.flush_control();
    assert!(session.is_playing());

    observer.emit(false, 0.0);
    session.flush_control();
    assert!(!session.is_playing());
}

/// it should never countermand a manual stop from visibility
#[test]
fn auto_play_never_countermands_a_manual_stop() {
    let (mut session, observer) = autoplay_session(json!(true));
    observer.emit(true, 1.0);
    session.flush_control();
    assert!(session.is_playing());

    session.stop();
    observer.emit(true, 1.0);
    session.flush_control();
    assert!(!session.is_playing());
}

/// it should fire only on the first entry when configured once
#[test]
fn once_fires_only_on_the_first_entry() {
    let (mut session, observer) =
        autoplay_session(json!({ "once": true, "stop_on_exit": false }));
    observer.emit(true, 1.0);
    session.flush_control();
    assert!(session.is_playing());

    session.stop();
    session.reset_override();
    observer.emit(true, 1.0);
    session.flush_control();
    assert!(!session.is_playing());
}

/// it should unsubscribe the observation on cleanup
#[test]
fn cleanup_tears_the_observation_down() {
    let (mut session, observer) = autoplay_session(json!(true));
    assert_eq!(observer.dropped.get(), 0);
    session.cleanup();
    assert_eq!(observer.dropped.get(), 1);

    // A late event is inert: a cleaned session ignores control requests.
    observer.emit(true, 1.0);
    session.flush_control();
    assert!(!session.is_playing());
}
