//! The capability-module contract.
//!
//! A module is one independently authored capability (stagger, timeline,
//! autoplay, ...) satisfying a single explicit shape: required `descriptor`
//! and `setup`, everything else optional with defaulted no-ops. The duck
//! typing of ad-hoc plugin objects is deliberately replaced by this trait so
//! malformed modules fail at registration, not mid-session.

use std::any::Any;

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use choreo_api_core::{OrchestrationConfig, Unsubscribe};

use crate::context::SharedContext;

/// Default module priority; higher priorities are set up first.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Static metadata for one capability module.
#[derive(Clone, Debug)]
pub struct Descriptor {
    /// Unique within a registry.
    pub name: String,
    pub version: String,
    /// Setup order: descending, ties keep registration order.
    pub priority: i32,
    /// Configuration sub-key whose truthiness activates the module by
    /// default. Defaults to the module name.
    pub option_key: String,
    /// Hard dependencies: these modules must be active too.
    pub requires: Vec<String>,
    /// Soft dependencies: consulted if active, ignored otherwise.
    pub optional: Vec<String>,
    /// Modules this one refuses to run alongside.
    pub conflicts_with: Vec<String>,
    /// Teardown order override; defaults to `priority` (ascending teardown,
    /// i.e. the reverse of setup order).
    pub cleanup_priority: Option<i32>,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            option_key: name.clone(),
            name,
            version: version.into(),
            priority: DEFAULT_PRIORITY,
            requires: Vec::new(),
            optional: Vec::new(),
            conflicts_with: Vec::new(),
            cleanup_priority: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_option_key(mut self, key: impl Into<String>) -> Self {
        self.option_key = key.into();
        self
    }

    pub fn requires(mut self, names: &[&str]) -> Self {
        self.requires = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn optional(mut self, names: &[&str]) -> Self {
        self.optional = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn conflicts_with(mut self, names: &[&str]) -> Self {
        self.conflicts_with = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_cleanup_priority(mut self, priority: i32) -> Self {
        self.cleanup_priority = Some(priority);
        self
    }

    /// Effective teardown rank.
    pub fn cleanup_rank(&self) -> i32 {
        self.cleanup_priority.unwrap_or(self.priority)
    }
}

/// Per-session instance created by a module's setup. Exclusively owned by the
/// session that created it; never shared across sessions.
pub trait ModuleSystem: Any {
    fn play(&mut self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn pause(&mut self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn resume(&mut self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn stop(&mut self, ctx: &SharedContext) {
        let _ = ctx;
    }
    /// Modules stop their own machinery here; the session does not call
    /// `stop` again during teardown.
    fn cleanup(&mut self, ctx: &SharedContext) {
        let _ = ctx;
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One merged-API endpoint: name plus callable.
pub type ApiFn = Box<dyn FnMut(JsonValue) -> JsonValue>;

/// The unified capability API handed to the caller: every active module's
/// contributions shallow-merged in priority order.
#[derive(Default)]
pub struct SessionApi {
    entries: IndexMap<String, ApiFn>,
}

impl SessionApi {
    /// Insert an endpoint. Collisions are accepted: the later writer wins,
    /// logged at debug level.
    pub fn insert(&mut self, name: impl Into<String>, f: ApiFn) {
        let name = name.into();
        if self.entries.contains_key(&name) {
            log::debug!("session api endpoint `{name}` overwritten by a later module");
        }
        self.entries.insert(name, f);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke an endpoint; `None` when no module contributed it.
    pub fn call(&mut self, name: &str, args: JsonValue) -> Option<JsonValue> {
        self.entries.get_mut(name).map(|f| f(args))
    }
}

/// The uniform capability contract every module satisfies.
pub trait CapabilityModule {
    fn descriptor(&self) -> Descriptor;

    /// Whether this module runs for the given configuration. The default is
    /// the declared option key's truthiness.
    fn activates(&self, config: &OrchestrationConfig) -> bool {
        config.is_enabled(&self.descriptor().option_key)
    }

    /// Create this session's system. `options` is the module's own config
    /// sub-key. A failure here aborts the entire session initialization.
    fn setup(&self, ctx: &SharedContext, options: &JsonValue) -> Result<Box<dyn ModuleSystem>>;

    /// Register reactive watchers. Runs strictly after every module's setup
    /// and after the orchestrator seeded its control callbacks into the
    /// exchange, so watchers may close over them.
    fn watch(&self, ctx: &SharedContext, system: &mut dyn ModuleSystem) -> Vec<Unsubscribe> {
        let _ = (ctx, system);
        Vec::new()
    }

    /// Contribute endpoints to the merged session API.
    fn contribute_api(
        &self,
        ctx: &SharedContext,
        system: &mut dyn ModuleSystem,
    ) -> Vec<(String, ApiFn)> {
        let _ = (ctx, system);
        Vec::new()
    }

    fn before_play(&self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn after_play(&self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn before_pause(&self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn after_pause(&self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn before_stop(&self, ctx: &SharedContext) {
        let _ = ctx;
    }
    fn after_stop(&self, ctx: &SharedContext) {
        let _ = ctx;
    }
}
