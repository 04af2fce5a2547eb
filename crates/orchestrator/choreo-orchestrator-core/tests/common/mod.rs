//! Shared fixtures: a spy module that records every lifecycle call, a
//! demand-only scheduler, a fake visibility observer, and effect handles
//! with observable flags.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value as JsonValue};

use choreo_api_core::{
    EffectHandle, FrameScheduler, OrchestrationConfig, TargetRef, Unsubscribe, VisibilityEvent,
    VisibilityObserver,
};
use choreo_orchestrator::{ApiFn, CapabilityModule, Descriptor, ModuleSystem, SharedContext};
use choreo_timing::SharedClock;

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[derive(Default)]
pub struct NullScheduler {
    next: u64,
}

impl FrameScheduler for NullScheduler {
    fn request_frame(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
    fn cancel_frame(&mut self, _handle: u64) {}
}

pub fn clock() -> SharedClock {
    SharedClock::new(Box::new(NullScheduler::default()))
}

pub fn target() -> TargetRef {
    TargetRef::new("fixture")
}

/// Config enabling exactly the named option keys.
pub fn enabling(names: &[&str]) -> OrchestrationConfig {
    let mut root = Map::new();
    for name in names {
        root.insert(name.to_string(), JsonValue::Bool(true));
    }
    OrchestrationConfig::new(JsonValue::Object(root))
}

/// Spy module: every lifecycle call lands in the shared log as
/// `"<name>:<event>"`.
pub struct TestModule {
    descriptor: Descriptor,
    log: Log,
    fail_setup: bool,
}

impl TestModule {
    pub fn new(name: &str, log: &Log) -> Rc<Self> {
        Self::with_descriptor(Descriptor::new(name, "0.0.0"), log)
    }

    pub fn with_descriptor(descriptor: Descriptor, log: &Log) -> Rc<Self> {
        Rc::new(Self {
            descriptor,
            log: Rc::clone(log),
            fail_setup: false,
        })
    }

    pub fn failing(name: &str, log: &Log) -> Rc<Self> {
        Rc::new(Self {
            descriptor: Descriptor::new(name, "0.0.0"),
            log: Rc::clone(log),
            fail_setup: true,
        })
    }
}

struct TestSystem {
    name: String,
    log: Log,
}

impl TestSystem {
    fn record(&self, event: &str) {
        self.log.borrow_mut().push(format!("{}:{event}", self.name));
    }
}

impl ModuleSystem for TestSystem {
    fn play(&mut self, _ctx: &SharedContext) {
        self.record("play");
    }
    fn pause(&mut self, _ctx: &SharedContext) {
        self.record("pause");
    }
    fn resume(&mut self, _ctx: &SharedContext) {
        self.record("resume");
    }
    fn stop(&mut self, _ctx: &SharedContext) {
        self.record("stop");
    }
    fn cleanup(&mut self, _ctx: &SharedContext) {
        self.record("cleanup");
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl CapabilityModule for TestModule {
    fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }

    fn setup(&self, _ctx: &SharedContext, _options: &JsonValue) -> Result<Box<dyn ModuleSystem>> {
        if self.fail_setup {
            return Err(anyhow!("induced setup failure"));
        }
        self.log
            .borrow_mut()
            .push(format!("{}:setup", self.descriptor.name));
        Ok(Box::new(TestSystem {
            name: self.descriptor.name.clone(),
            log: Rc::clone(&self.log),
        }))
    }

    fn watch(&self, _ctx: &SharedContext, _system: &mut dyn ModuleSystem) -> Vec<Unsubscribe> {
        let name = self.descriptor.name.clone();
        let log = Rc::clone(&self.log);
        log.borrow_mut().push(format!("{name}:watch"));
        vec![Box::new(move || {
            log.borrow_mut().push(format!("{name}:unwatch"));
        })]
    }

    fn contribute_api(
        &self,
        _ctx: &SharedContext,
        _system: &mut dyn ModuleSystem,
    ) -> Vec<(String, ApiFn)> {
        let key = format!("{}.ping", self.descriptor.name);
        let name = self.descriptor.name.clone();
        vec![(
            key,
            Box::new(move |args| json!({ "from": name, "args": args })) as ApiFn,
        )]
    }
}

/// Effect handle whose cancel/finish flips shared flags.
#[derive(Clone, Default)]
pub struct EffectFlags {
    pub cancelled: Rc<Cell<bool>>,
    pub finished: Rc<Cell<bool>>,
}

pub struct RecordingEffect(pub EffectFlags);

impl EffectHandle for RecordingEffect {
    fn cancel(&mut self) {
        self.0.cancelled.set(true);
    }
    fn finish(&mut self) {
        self.0.finished.set(true);
    }
}

/// Fake visibility observer: tests push events in by hand.
#[derive(Default)]
pub struct FakeObserver {
    sinks: RefCell<Vec<Box<dyn FnMut(VisibilityEvent)>>>,
    pub thresholds: RefCell<Vec<f64>>,
    pub dropped: Rc<Cell<u32>>,
}

impl FakeObserver {
    pub fn emit(&self, visible: bool, ratio: f64) {
        for sink in self.sinks.borrow_mut().iter_mut() {
            sink(VisibilityEvent { visible, ratio });
        }
    }
}

impl VisibilityObserver for FakeObserver {
    fn observe(
        &self,
        _target: &TargetRef,
        threshold: f64,
        callback: Box<dyn FnMut(VisibilityEvent)>,
    ) -> Unsubscribe {
        self.thresholds.borrow_mut().push(threshold);
        self.sinks.borrow_mut().push(callback);
        let dropped = Rc::clone(&self.dropped);
        Box::new(move || dropped.set(dropped.get() + 1))
    }
}
