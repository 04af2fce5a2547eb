//! Autoplay capability module: drives play/stop from target visibility.
//!
//! The module itself never touches the session; it enqueues automatic
//! control requests through the seeded handle, leaving arbitration with the
//! session.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use choreo_api_core::{Unsubscribe, VisibilityObserver};

use crate::context::SharedContext;
use crate::control::Origin;
use crate::module::{CapabilityModule, Descriptor, ModuleSystem};

use super::parse_options;

fn default_threshold() -> f64 {
    0.2
}

fn default_stop_on_exit() -> bool {
    true
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct AutoplayOptions {
    /// Visible-area ratio that counts as "in view".
    pub threshold: f64,
    /// Stop (automatically) when the target leaves the viewport.
    pub stop_on_exit: bool,
    /// Fire the play request only on the first entry.
    pub once: bool,
}

impl Default for AutoplayOptions {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            stop_on_exit: default_stop_on_exit(),
            once: false,
        }
    }
}

/// The autoplay capability. The host supplies the platform's visibility
/// observer at construction.
pub struct AutoplayModule {
    observer: Rc<dyn VisibilityObserver>,
}

impl AutoplayModule {
    pub fn new(observer: Rc<dyn VisibilityObserver>) -> Self {
        Self { observer }
    }
}

pub struct AutoplaySystem {
    options: AutoplayOptions,
    fired: Rc<Cell<bool>>,
}

impl AutoplaySystem {
    pub fn options(&self) -> AutoplayOptions {
        self.options
    }
}

impl ModuleSystem for AutoplaySystem {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl CapabilityModule for AutoplayModule {
    fn descriptor(&self) -> Descriptor {
        // Low priority: runs after the capabilities it triggers are set up.
        Descriptor::new("autoplay", env!("CARGO_PKG_VERSION"))
            .with_priority(40)
            .optional(&["stagger", "timeline"])
    }

    fn setup(&self, _ctx: &SharedContext, options: &JsonValue) -> Result<Box<dyn ModuleSystem>> {
        let options: AutoplayOptions = parse_options(options, "autoplay")?;
        Ok(Box::new(AutoplaySystem {
            options,
            fired: Rc::new(Cell::new(false)),
        }))
    }

    fn watch(&self, ctx: &SharedContext, system: &mut dyn ModuleSystem) -> Vec<Unsubscribe> {
        let Some(sys) = system.as_any().downcast_ref::<AutoplaySystem>() else {
            return Vec::new();
        };
        let Some(control) = ctx.control() else {
            log::warn!("autoplay active but no control handle was seeded");
            return Vec::new();
        };
        let options = sys.options;
        let fired = Rc::clone(&sys.fired);
        let unsub = self.observer.observe(
            &ctx.target(),
            options.threshold,
            Box::new(move |event| {
                if event.visible {
                    if options.once && fired.get() {
                        return;
                    }
                    fired.set(true);
                    control.play(Origin::Auto);
                } else if options.stop_on_exit {
                    control.stop(Origin::Auto);
                }
            }),
        );
        vec![unsub]
    }
}
