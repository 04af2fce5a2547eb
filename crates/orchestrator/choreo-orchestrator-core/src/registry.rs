//! Module registry and the three-phase initialization protocol.
//!
//! Phase order is a hard contract: activation + constraint validation happen
//! before any setup runs; watcher registration happens only after every setup
//! succeeded *and* the session seeded its callbacks into the exchange; API
//! contribution runs last.

use std::cmp::Reverse;
use std::fmt;
use std::rc::Rc;

use anyhow::Result;
use hashbrown::HashSet;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use choreo_api_core::{ConfigError, OrchestrationConfig, Unsubscribe};

use crate::context::{keys, ExchangeValue, SharedContext};
use crate::module::{ApiFn, CapabilityModule, ModuleSystem, SessionApi};

/// The activation set for one session, in setup order, with the systems each
/// module's setup produced.
pub struct ActiveModules {
    pub ordered: Vec<Rc<dyn CapabilityModule>>,
    pub systems: IndexMap<String, Box<dyn ModuleSystem>>,
}

impl ActiveModules {
    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|m| m.descriptor().name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

// Holds trait objects, so derive is unavailable; the names are what matters.
impl fmt::Debug for ActiveModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveModules")
            .field("ordered", &self.names())
            .finish()
    }
}

/// Collection of registered module descriptors. Hosts keep one long-lived
/// registry; sessions reference it (optionally through a scoped view).
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, Rc<dyn CapabilityModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. An empty name or version is rejected; a duplicate
    /// name warns and overwrites the previous registration, never merges.
    pub fn register(&mut self, module: Rc<dyn CapabilityModule>) -> Result<(), ConfigError> {
        let d = module.descriptor();
        if d.name.is_empty() {
            return Err(ConfigError::InvalidDescriptor {
                module: "<unnamed>".into(),
                reason: "missing name".into(),
            });
        }
        if d.version.is_empty() {
            return Err(ConfigError::InvalidDescriptor {
                module: d.name,
                reason: "missing version".into(),
            });
        }
        if self.modules.contains_key(&d.name) {
            log::warn!("module `{}` registered twice; overwriting the earlier registration", d.name);
        }
        self.modules.insert(d.name, module);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn CapabilityModule>> {
        self.modules.get(name).cloned()
    }

    /// A filtered view restricted to `allowed` names. The view references the
    /// same module instances; nothing is re-registered.
    pub fn scoped(&self, allowed: &[&str]) -> ModuleRegistry {
        ModuleRegistry {
            modules: self
                .modules
                .iter()
                .filter(|(name, _)| allowed.contains(&name.as_str()))
                .map(|(name, module)| (name.clone(), Rc::clone(module)))
                .collect(),
        }
    }

    /// Phase one: compute the activation set, validate constraints, and run
    /// every active module's setup in descending priority order.
    ///
    /// Constraint violations surface before any setup executes. A module
    /// whose setup fails aborts the whole session — no partial activation.
    pub fn setup_plugins(
        &self,
        ctx: &SharedContext,
        config: &OrchestrationConfig,
    ) -> Result<ActiveModules> {
        let mut ordered: Vec<Rc<dyn CapabilityModule>> = self
            .modules
            .values()
            .filter(|m| m.activates(config))
            .cloned()
            .collect();

        let names: HashSet<String> = ordered.iter().map(|m| m.descriptor().name).collect();
        for module in &ordered {
            let d = module.descriptor();
            for requirement in &d.requires {
                if !names.contains(requirement) {
                    return Err(ConfigError::MissingDependency {
                        module: d.name.clone(),
                        requirement: requirement.clone(),
                    }
                    .into());
                }
            }
            for other in &d.conflicts_with {
                if names.contains(other) {
                    return Err(ConfigError::ModuleConflict {
                        module: d.name.clone(),
                        other: other.clone(),
                    }
                    .into());
                }
            }
        }

        // Stable: equal priorities keep registration order.
        ordered.sort_by_key(|m| Reverse(m.descriptor().priority));

        let mut systems: IndexMap<String, Box<dyn ModuleSystem>> = IndexMap::new();
        for module in &ordered {
            let d = module.descriptor();
            let options = config.module_options(&d.option_key);
            let system = module.setup(ctx, &options).map_err(|e| {
                log::error!("module `{}` failed setup: {e:#}", d.name);
                e.context(format!("module `{}` setup failed", d.name))
            })?;
            systems.insert(d.name, system);
        }

        let active = ActiveModules { ordered, systems };
        ctx.set(
            keys::ACTIVE_MODULES,
            ExchangeValue::Json(JsonValue::from(active.names())),
        );
        Ok(active)
    }

    /// Phase two: watcher registration, in setup order. Must run after the
    /// session seeded its control callbacks — watchers commonly close over
    /// them.
    pub fn register_watchers(ctx: &SharedContext, active: &mut ActiveModules) -> Vec<Unsubscribe> {
        if !ctx.has(keys::CONTROL) {
            log::warn!("registering watchers before orchestrator callbacks were seeded");
        }
        let mut unsubs: Vec<Unsubscribe> = Vec::new();
        for module in &active.ordered {
            let name = module.descriptor().name;
            if let Some(system) = active.systems.get_mut(&name) {
                unsubs.extend(module.watch(ctx, system.as_mut()));
            }
        }
        unsubs
    }

    /// Phase three: shallow-merge every module's API contribution in setup
    /// order; later (lower-priority) keys overwrite earlier ones.
    pub fn build_api(ctx: &SharedContext, active: &mut ActiveModules) -> SessionApi {
        let mut api = SessionApi::default();
        for module in &active.ordered {
            let name = module.descriptor().name;
            if let Some(system) = active.systems.get_mut(&name) {
                let contributions: Vec<(String, ApiFn)> = module.contribute_api(ctx, system.as_mut());
                for (key, f) in contributions {
                    api.insert(key, f);
                }
            }
        }
        api
    }

    /// Teardown order: exact reverse of setup order, re-ranked (stably) by
    /// ascending cleanup priority so producer modules outlive their
    /// consumers.
    pub fn cleanup_order(active: &ActiveModules) -> Vec<String> {
        let mut order: Vec<(i32, String)> = active
            .ordered
            .iter()
            .rev()
            .map(|m| {
                let d = m.descriptor();
                (d.cleanup_rank(), d.name)
            })
            .collect();
        order.sort_by_key(|(rank, _)| *rank);
        order.into_iter().map(|(_, name)| name).collect()
    }
}
