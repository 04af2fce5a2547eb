//! The orchestration session.
//!
//! One session per target: it owns the systems its modules set up, fans every
//! lifecycle transition out to them in a fixed order, and arbitrates between
//! manual control and automatic triggers. Flag updates always precede hook
//! dispatch so a hook observing the context sees the post-transition state.

use std::rc::Rc;

use anyhow::Result;

use choreo_api_core::{EnvSignals, OrchestrationConfig, TargetRef, Unsubscribe, VarScope};
use choreo_timing::SharedClock;

use crate::context::{keys, ExchangeValue, SharedContext};
use crate::control::{ControlHandle, ControlRequest, Origin};
use crate::module::SessionApi;
use crate::registry::{ActiveModules, ModuleRegistry};
use crate::shared_state::SharedStateRegistry;

/// The user's last explicit instruction. Automatic triggers never countermand
/// it: an auto play is dropped under `Stop`, an auto stop under `Play`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ManualAction {
    Play,
    Stop,
}

type Hook = Box<dyn FnMut(&SharedContext) -> Result<()>>;

/// Caller-supplied lifecycle hooks. A hook error is logged and swallowed; it
/// never vetoes the transition that already happened.
#[derive(Default)]
pub struct SessionHooks {
    pub before_play: Option<Hook>,
    pub after_play: Option<Hook>,
    pub before_pause: Option<Hook>,
    pub after_pause: Option<Hook>,
    pub after_stop: Option<Hook>,
    /// Fires on every stop, including ones requested by modules.
    pub on_stop: Option<Hook>,
}

fn run_hook(slot: &mut Option<Hook>, ctx: &SharedContext, name: &str) {
    if let Some(hook) = slot.as_mut() {
        if let Err(e) = hook(ctx) {
            log::warn!("session hook `{name}` failed: {e:#}");
        }
    }
}

/// Builder for a [`Session`]. `target`, `config`, `clock`, and `registry` are
/// required; everything else has a sensible default.
pub struct SessionBuilder {
    target: TargetRef,
    config: OrchestrationConfig,
    clock: SharedClock,
    registry: ModuleRegistry,
    restrict: Option<Vec<String>>,
    hooks: SessionHooks,
    vars: Option<Rc<dyn VarScope>>,
    env: Option<EnvSignals>,
    shared_state: Option<SharedStateRegistry>,
}

impl SessionBuilder {
    pub fn new(
        target: impl Into<TargetRef>,
        config: OrchestrationConfig,
        clock: SharedClock,
        registry: ModuleRegistry,
    ) -> Self {
        Self {
            target: target.into(),
            config,
            clock,
            registry,
            restrict: None,
            hooks: SessionHooks::default(),
            vars: None,
            env: None,
            shared_state: None,
        }
    }

    /// Restrict the session to a subset of the registry's modules.
    pub fn restrict_to(mut self, names: &[&str]) -> Self {
        self.restrict = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn vars(mut self, vars: Rc<dyn VarScope>) -> Self {
        self.vars = Some(vars);
        self
    }

    pub fn env(mut self, env: EnvSignals) -> Self {
        self.env = Some(env);
        self
    }

    pub fn shared_state(mut self, registry: SharedStateRegistry) -> Self {
        self.shared_state = Some(registry);
        self
    }

    /// Run the three-phase initialization protocol and assemble the session.
    pub fn build(self) -> Result<Session> {
        let ctx = SharedContext::new(self.target, self.config.clone());
        if let Some(env) = self.env {
            ctx.set_env(env);
        }
        ctx.set(
            keys::CLOCK,
            ExchangeValue::Shared(Rc::new(self.clock.clone())),
        );
        if let Some(vars) = &self.vars {
            ctx.set(keys::VARS, ExchangeValue::Vars(Rc::clone(vars)));
        }

        let registry = match &self.restrict {
            Some(names) => {
                let allowed: Vec<&str> = names.iter().map(String::as_str).collect();
                self.registry.scoped(&allowed)
            }
            None => self.registry,
        };

        let mut active = registry.setup_plugins(&ctx, &self.config)?;

        // Control callbacks go in before watchers so they can close over the
        // handle.
        let control = ControlHandle::new();
        ctx.set(keys::CONTROL, ExchangeValue::Control(control.clone()));

        let watchers = ModuleRegistry::register_watchers(&ctx, &mut active);
        let api = ModuleRegistry::build_api(&ctx, &mut active);

        Ok(Session {
            ctx,
            clock: self.clock,
            active,
            api,
            watchers,
            hooks: self.hooks,
            control,
            manual_override: None,
            cleanups: Vec::new(),
            acquired: Vec::new(),
            shared_state: self.shared_state,
            env_paused: false,
            cleaned: false,
        })
    }
}

pub struct Session {
    ctx: SharedContext,
    clock: SharedClock,
    active: ActiveModules,
    api: SessionApi,
    watchers: Vec<Unsubscribe>,
    hooks: SessionHooks,
    control: ControlHandle,
    manual_override: Option<ManualAction>,
    cleanups: Vec<Box<dyn FnOnce()>>,
    acquired: Vec<String>,
    shared_state: Option<SharedStateRegistry>,
    env_paused: bool,
    cleaned: bool,
}

impl Session {
    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Enqueue-only handle; the same one modules see under
    /// [`keys::CONTROL`].
    pub fn handle(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.ctx.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.is_paused()
    }

    pub fn api(&self) -> &SessionApi {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut SessionApi {
        &mut self.api
    }

    pub fn call(&mut self, name: &str, args: serde_json::Value) -> Option<serde_json::Value> {
        self.api.call(name, args)
    }

    /// Typed access to a module's system.
    pub fn system_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.active
            .systems
            .get_mut(name)
            .and_then(|s| s.as_any_mut().downcast_mut::<T>())
    }

    /// Register teardown work to run during cleanup, after module cleanup.
    pub fn add_cleanup(&mut self, f: impl FnOnce() + 'static) {
        self.cleanups.push(Box::new(f));
    }

    /// Acquire a slot from the shared-state registry, to be released during
    /// this session's cleanup.
    pub fn acquire_shared(
        &mut self,
        name: impl Into<String>,
        init: impl FnOnce() -> ExchangeValue,
    ) -> Option<ExchangeValue> {
        let registry = self.shared_state.as_ref()?;
        let name = name.into();
        let value = registry.acquire(name.clone(), init);
        self.acquired.push(name);
        Some(value)
    }

    /// Manual play. Restarts from paused; a no-op while actively playing.
    pub fn play(&mut self) {
        self.manual_override = Some(ManualAction::Play);
        self.play_inner();
    }

    /// Automatic play (visibility, scroll, autoplay). Dropped while the
    /// user's last explicit instruction was stop.
    pub fn auto_play(&mut self) {
        if self.manual_override == Some(ManualAction::Stop) {
            log::debug!("auto play suppressed by manual stop");
            return;
        }
        self.play_inner();
    }

    fn play_inner(&mut self) {
        if self.cleaned || (self.ctx.is_playing() && !self.ctx.is_paused()) {
            return;
        }
        self.ctx.set_playing(true);
        self.ctx.set_paused(false);
        self.env_paused = false;
        for module in &self.active.ordered {
            module.before_play(&self.ctx);
        }
        run_hook(&mut self.hooks.before_play, &self.ctx, "before_play");
        for module in &self.active.ordered {
            let name = module.descriptor().name;
            if let Some(system) = self.active.systems.get_mut(&name) {
                system.play(&self.ctx);
            }
        }
        for module in &self.active.ordered {
            module.after_play(&self.ctx);
        }
        run_hook(&mut self.hooks.after_play, &self.ctx, "after_play");
    }

    /// Pause in place. A no-op unless actively playing. Pause carries no
    /// origin: it never participates in override arbitration.
    pub fn pause(&mut self) {
        if self.cleaned || !self.ctx.is_playing() || self.ctx.is_paused() {
            return;
        }
        self.ctx.set_paused(true);
        for module in &self.active.ordered {
            module.before_pause(&self.ctx);
        }
        run_hook(&mut self.hooks.before_pause, &self.ctx, "before_pause");
        for module in &self.active.ordered {
            let name = module.descriptor().name;
            if let Some(system) = self.active.systems.get_mut(&name) {
                system.pause(&self.ctx);
            }
        }
        for module in &self.active.ordered {
            module.after_pause(&self.ctx);
        }
        run_hook(&mut self.hooks.after_pause, &self.ctx, "after_pause");
    }

    /// Resume a paused session; elapsed time excludes the paused span.
    pub fn resume(&mut self) {
        if self.cleaned || !self.ctx.is_paused() {
            return;
        }
        self.ctx.set_paused(false);
        self.env_paused = false;
        for module in &self.active.ordered {
            let name = module.descriptor().name;
            if let Some(system) = self.active.systems.get_mut(&name) {
                system.resume(&self.ctx);
            }
        }
    }

    /// Manual stop.
    pub fn stop(&mut self) {
        self.manual_override = Some(ManualAction::Stop);
        self.stop_inner();
    }

    /// Automatic stop. Dropped while the user's last explicit instruction
    /// was play. A manually-paused session still honors it: paused is not
    /// playing.
    pub fn auto_stop(&mut self) {
        if self.manual_override == Some(ManualAction::Play) && !self.ctx.is_paused() {
            log::debug!("auto stop suppressed by manual play");
            return;
        }
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        if self.cleaned || (!self.ctx.is_playing() && !self.ctx.is_paused()) {
            return;
        }
        for module in &self.active.ordered {
            module.before_stop(&self.ctx);
        }
        for module in &self.active.ordered {
            let name = module.descriptor().name;
            if let Some(system) = self.active.systems.get_mut(&name) {
                system.stop(&self.ctx);
            }
        }
        self.ctx.set_playing(false);
        self.ctx.set_paused(false);
        self.env_paused = false;
        for module in &self.active.ordered {
            module.after_stop(&self.ctx);
        }
        run_hook(&mut self.hooks.after_stop, &self.ctx, "after_stop");
        run_hook(&mut self.hooks.on_stop, &self.ctx, "on_stop");
    }

    /// Forget the manual override; subsequent automatic triggers apply
    /// unconditionally again.
    pub fn reset_override(&mut self) {
        self.manual_override = None;
    }

    pub fn manual_override(&self) -> Option<ManualAction> {
        self.manual_override
    }

    /// Drain the control queue modules write into, applying arbitration per
    /// request. Hosts call this once per frame or after known trigger points.
    pub fn flush_control(&mut self) {
        for request in self.control.drain() {
            match request {
                ControlRequest::Play(Origin::Manual) => self.play(),
                ControlRequest::Play(Origin::Auto) => self.auto_play(),
                ControlRequest::Pause => self.pause(),
                ControlRequest::Stop(Origin::Manual) => self.stop(),
                ControlRequest::Stop(Origin::Auto) => self.auto_stop(),
                ControlRequest::Resume => self.resume(),
            }
        }
    }

    /// Feed updated environment signals. `should_pause` pauses the session
    /// and remembers that the pause was environmental, so clearing the
    /// signal resumes — without ever resuming over a caller's own pause.
    pub fn apply_env(&mut self, env: EnvSignals) {
        self.ctx.set_env(env);
        if env.should_pause {
            if self.ctx.is_playing() && !self.ctx.is_paused() {
                self.pause();
                self.env_paused = true;
            }
        } else if self.env_paused {
            self.env_paused = false;
            self.resume();
        }
    }

    /// Tear the session down. Watchers first (no reactive re-entry during
    /// teardown), then module cleanup in reverse setup order adjusted by
    /// each module's cleanup priority, then caller cleanups, then shared
    /// state release. Idempotent.
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        for unsub in self.watchers.drain(..) {
            unsub();
        }
        for name in ModuleRegistry::cleanup_order(&self.active) {
            if let Some(system) = self.active.systems.get_mut(&name) {
                system.cleanup(&self.ctx);
            }
        }
        for f in self.cleanups.drain(..) {
            f();
        }
        if let Some(registry) = &self.shared_state {
            for name in self.acquired.drain(..) {
                registry.release(&name);
            }
        }
        self.ctx.set_playing(false);
        self.ctx.set_paused(false);
        self.ctx.clear_exchange();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cleanup();
    }
}
