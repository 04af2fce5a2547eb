//! Per-session shared context.
//!
//! One per orchestration session: the target reference, the configuration
//! snapshot, the playing/paused flags (single source of truth for "is this
//! session animating"), environment signals, and the exchange — the only
//! inter-module data channel.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use choreo_api_core::{EnvSignals, OrchestrationConfig, TargetRef, VarScope};

use crate::control::ControlHandle;

/// Well-known exchange keys seeded by the orchestrator before watcher
/// registration.
pub mod keys {
    /// [`ExchangeValue::Control`] — the session's control handle.
    pub const CONTROL: &str = "orchestrator.control";
    /// [`ExchangeValue::Vars`] — scoped variable helpers for the target.
    pub const VARS: &str = "orchestrator.vars";
    /// [`ExchangeValue::Json`] — ordered list of active module names.
    pub const ACTIVE_MODULES: &str = "orchestrator.modules";
    /// [`ExchangeValue::Shared`] — the session's frame clock, seeded before
    /// module setup so systems can subscribe to it.
    pub const CLOCK: &str = "orchestrator.clock";
}

/// One exchange slot. Last write wins; the convention (not enforced) is one
/// writer module per key, any number of readers.
#[derive(Clone)]
pub enum ExchangeValue {
    Json(JsonValue),
    Control(ControlHandle),
    Vars(Rc<dyn VarScope>),
    Shared(Rc<dyn Any>),
}

impl ExchangeValue {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_control(&self) -> Option<ControlHandle> {
        match self {
            Self::Control(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn as_vars(&self) -> Option<Rc<dyn VarScope>> {
        match self {
            Self::Vars(v) => Some(Rc::clone(v)),
            _ => None,
        }
    }

    pub fn downcast_shared<T: 'static>(&self) -> Option<Rc<T>> {
        match self {
            Self::Shared(v) => Rc::clone(v).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for ExchangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Control(_) => f.write_str("Control(..)"),
            Self::Vars(_) => f.write_str("Vars(..)"),
            Self::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

struct ContextInner {
    target: TargetRef,
    config: OrchestrationConfig,
    playing: bool,
    paused: bool,
    env: EnvSignals,
    exchange: HashMap<String, ExchangeValue>,
    session_id: Uuid,
}

/// Cheap-clone handle to one session's shared state.
#[derive(Clone)]
pub struct SharedContext {
    inner: Rc<RefCell<ContextInner>>,
}

impl SharedContext {
    pub fn new(target: TargetRef, config: OrchestrationConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContextInner {
                target,
                config,
                playing: false,
                paused: false,
                env: EnvSignals::default(),
                exchange: HashMap::new(),
                session_id: Uuid::new_v4(),
            })),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.borrow().session_id
    }

    pub fn target(&self) -> TargetRef {
        self.inner.borrow().target.clone()
    }

    /// The target may change over the session's life (responsive swaps).
    pub fn set_target(&self, target: TargetRef) {
        self.inner.borrow_mut().target = target;
    }

    pub fn config(&self) -> OrchestrationConfig {
        self.inner.borrow().config.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.borrow().playing
    }

    pub fn is_paused(&self) -> bool {
        self.inner.borrow().paused
    }

    pub fn set_playing(&self, playing: bool) {
        self.inner.borrow_mut().playing = playing;
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.borrow_mut().paused = paused;
    }

    pub fn env(&self) -> EnvSignals {
        self.inner.borrow().env
    }

    pub fn set_env(&self, env: EnvSignals) {
        self.inner.borrow_mut().env = env;
    }

    // Exchange: string key → value, last write wins, no cross-writer
    // ordering guarantees.

    pub fn set(&self, key: impl Into<String>, value: ExchangeValue) {
        self.inner.borrow_mut().exchange.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<ExchangeValue> {
        self.inner.borrow().exchange.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.borrow().exchange.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<ExchangeValue> {
        self.inner.borrow_mut().exchange.remove(key)
    }

    pub fn clear_exchange(&self) {
        self.inner.borrow_mut().exchange.clear();
    }

    /// Convenience: the seeded control handle, if initialization reached the
    /// seeding step.
    pub fn control(&self) -> Option<ControlHandle> {
        self.get(keys::CONTROL).and_then(|v| v.as_control())
    }

    /// Convenience: the seeded scoped variable helpers.
    pub fn vars(&self) -> Option<Rc<dyn VarScope>> {
        self.get(keys::VARS).and_then(|v| v.as_vars())
    }
}
