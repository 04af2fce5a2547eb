//! choreo-orchestrator
//!
//! The per-session plugin orchestration engine: a registry resolves which
//! capability modules activate for a configuration, validates their
//! dependency/conflict constraints, runs the three-phase initialization
//! protocol (setup → watcher registration → API contribution), and the
//! session aggregates every module's lifecycle into one coherent
//! play/pause/stop/resume/cleanup surface.

pub mod bus;
pub mod context;
pub mod control;
pub mod module;
pub mod modules;
pub mod registry;
pub mod session;
pub mod shared_state;

pub use crate::bus::{BusSubscription, EventBus};
pub use crate::context::{keys, ExchangeValue, SharedContext};
pub use crate::control::{ControlHandle, ControlRequest, Origin};
pub use crate::module::{
    ApiFn, CapabilityModule, Descriptor, ModuleSystem, SessionApi, DEFAULT_PRIORITY,
};
pub use crate::modules::{AutoplayModule, StaggerModule, TimelineModule};
pub use crate::registry::{ActiveModules, ModuleRegistry};
pub use crate::session::{ManualAction, Session, SessionBuilder, SessionHooks};
pub use crate::shared_state::SharedStateRegistry;
