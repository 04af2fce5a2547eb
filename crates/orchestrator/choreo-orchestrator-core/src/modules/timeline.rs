//! Timeline capability module: a multi-phase cycle bound to the session
//! lifecycle, reporting its state through the exchange.

use std::rc::Rc;

use anyhow::Result;
use serde_json::{json, Value as JsonValue};

use choreo_api_core::EffectHandle;
use choreo_timing::{PhaseSpec, TimelineDelegate, TimelineRun, TimelineSpec};

use crate::context::{ExchangeValue, SharedContext};
use crate::module::{ApiFn, CapabilityModule, Descriptor, ModuleSystem};

use super::{parse_options, session_clock};

/// Exchange keys the timeline delegate writes.
pub mod timeline_keys {
    /// Name of the most recently started phase.
    pub const PHASE: &str = "timeline.phase";
    /// Progress of the most recently reported phase, `{name, progress}`.
    pub const PROGRESS: &str = "timeline.progress";
    /// Whole-cycle progress in `[0, 1]`.
    pub const CYCLE_PROGRESS: &str = "timeline.cycle_progress";
    /// Zero-based index of the current cycle.
    pub const CYCLE: &str = "timeline.cycle";
}

/// Default delegate: mirrors timeline state into the exchange and clears the
/// session's playing flag when a non-looping run halts on its own.
pub struct ContextDelegate {
    ctx: SharedContext,
}

impl ContextDelegate {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }
}

impl TimelineDelegate for ContextDelegate {
    fn phase_started(&mut self, phase: &PhaseSpec, cycle: u64) -> Option<Box<dyn EffectHandle>> {
        self.ctx
            .set(timeline_keys::PHASE, ExchangeValue::Json(json!(phase.name)));
        self.ctx
            .set(timeline_keys::CYCLE, ExchangeValue::Json(json!(cycle)));
        None
    }

    fn phase_progress(&mut self, phase: &PhaseSpec, progress: f64) {
        self.ctx.set(
            timeline_keys::PROGRESS,
            ExchangeValue::Json(json!({ "name": phase.name, "progress": progress })),
        );
    }

    fn cycle_progress(&mut self, progress: f64) {
        self.ctx.set(
            timeline_keys::CYCLE_PROGRESS,
            ExchangeValue::Json(json!(progress)),
        );
    }

    // A natural halt is a state transition in its own right, not a stop
    // request, so it bypasses override arbitration.
    fn halted(&mut self) {
        self.ctx.set_playing(false);
        self.ctx.set_paused(false);
    }
}

type DelegateFactory = Rc<dyn Fn(&SharedContext) -> Box<dyn TimelineDelegate>>;

/// The timeline capability. Phase layout comes from configuration; the
/// delegate defaults to [`ContextDelegate`] but hosts may supply their own.
pub struct TimelineModule {
    delegate: DelegateFactory,
}

impl Default for TimelineModule {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineModule {
    pub fn new() -> Self {
        Self {
            delegate: Rc::new(|ctx| Box::new(ContextDelegate::new(ctx.clone()))),
        }
    }

    pub fn with_delegate(
        factory: impl Fn(&SharedContext) -> Box<dyn TimelineDelegate> + 'static,
    ) -> Self {
        Self {
            delegate: Rc::new(factory),
        }
    }
}

pub struct TimelineSystem {
    run: Rc<TimelineRun>,
}

impl TimelineSystem {
    pub fn run(&self) -> &TimelineRun {
        &self.run
    }
}

impl ModuleSystem for TimelineSystem {
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

impl CapabilityModule for TimelineModule {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new("timeline", env!("CARGO_PKG_VERSION"))
    }

    fn setup(&self, ctx: &SharedContext, options: &JsonValue) -> Result<Box<dyn ModuleSystem>> {
        let spec: TimelineSpec = parse_options(options, "timeline")?;
        let clock = session_clock(ctx)?;
        let run = TimelineRun::new(&clock, spec, (self.delegate)(ctx));
        Ok(Box::new(TimelineSystem { run: Rc::new(run) }))
    }

    fn contribute_api(
        &self,
        _ctx: &SharedContext,
        system: &mut dyn ModuleSystem,
    ) -> Vec<(String, ApiFn)> {
        let Some(sys) = system.as_any().downcast_ref::<TimelineSystem>() else {
            return Vec::new();
        };
        let progress = Rc::clone(&sys.run);
        let cycle = Rc::clone(&sys.run);
        vec![
            (
                "timeline.progress".into(),
                Box::new(move |_| json!(progress.progress())) as ApiFn,
            ),
            (
                "timeline.cycle".into(),
                Box::new(move |_| json!(cycle.cycle())) as ApiFn,
            ),
        ]
    }
}
