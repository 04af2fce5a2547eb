//! Stagger capability module: sequenced activation of a target list, driven
//! by the session lifecycle.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use choreo_api_core::EffectHandle;
use choreo_timing::{StaggerRun, StaggerSpec};

use crate::context::SharedContext;
use crate::module::{ApiFn, CapabilityModule, Descriptor, ModuleSystem};

use super::{parse_options, session_clock};

type EffectFactory = Rc<RefCell<dyn FnMut(usize) -> Option<Box<dyn EffectHandle>>>>;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StaggerOptions {
    /// Number of staggered targets.
    pub count: usize,
    #[serde(flatten)]
    pub spec: StaggerSpec,
}

/// The stagger capability. The host supplies the per-index effect factory at
/// construction; counts and delay policy come from configuration.
pub struct StaggerModule {
    effects: EffectFactory,
}

impl StaggerModule {
    pub fn new(effects: impl FnMut(usize) -> Option<Box<dyn EffectHandle>> + 'static) -> Self {
        Self {
            effects: Rc::new(RefCell::new(effects)),
        }
    }
}

pub struct StaggerSystem {
    run: Rc<StaggerRun>,
}

impl StaggerSystem {
    pub fn run(&self) -> &StaggerRun {
        &self.run
    }
}

impl ModuleSystem for StaggerSystem {
    fn play(&mut self, ctx: &SharedContext) {
        if ctx.env().degraded() {
            self.run.finish_now();
        } else {
            self.run.start();
        }
    }

    fn pause(&mut self, _ctx: &SharedContext) {
        self.run.pause();
    }

    fn resume(&mut self, _ctx: &SharedContext) {
        self.run.resume();
    }

    fn stop(&mut self, _ctx: &SharedContext) {
        self.run.stop();
    }

    fn cleanup(&mut self, _ctx: &SharedContext) {
        self.run.stop();
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl CapabilityModule for StaggerModule {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new("stagger", env!("CARGO_PKG_VERSION"))
    }

    fn setup(&self, ctx: &SharedContext, options: &JsonValue) -> Result<Box<dyn ModuleSystem>> {
        let opts: StaggerOptions = parse_options(options, "stagger")?;
        let clock = session_clock(ctx)?;
        let effects = Rc::clone(&self.effects);
        let run = StaggerRun::new(&clock, opts.count, opts.spec, move |i| {
            (&mut *effects.borrow_mut())(i)
        });
        Ok(Box::new(StaggerSystem { run: Rc::new(run) }))
    }

    fn contribute_api(
        &self,
        _ctx: &SharedContext,
        system: &mut dyn ModuleSystem,
    ) -> Vec<(String, ApiFn)> {
        let Some(sys) = system.as_any().downcast_ref::<StaggerSystem>() else {
            return Vec::new();
        };
        let delays = Rc::clone(&sys.run);
        let activated = Rc::clone(&sys.run);
        let restart = Rc::clone(&sys.run);
        vec![
            (
                "stagger.delays".into(),
                Box::new(move |_| json!(delays.delays())) as ApiFn,
            ),
            (
                "stagger.activated".into(),
                Box::new(move |_| json!(activated.activated_count())) as ApiFn,
            ),
            (
                "stagger.restart".into(),
                Box::new(move |_| {
                    restart.start();
                    JsonValue::Bool(true)
                }) as ApiFn,
            ),
        ]
    }
}
