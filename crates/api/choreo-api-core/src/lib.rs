//! choreo-api-core: shared contracts for the choreo orchestration engine.
//!
//! This crate carries the vocabulary the engine crates agree on: the host
//! collaborator traits (frame scheduling, visibility observation, scoped
//! variables), the per-session configuration surface, environment signals,
//! the effect-handle contract, and the configuration error taxonomy.

pub mod config;
pub mod effect;
pub mod env;
pub mod error;
pub mod host;
pub mod target;

pub use config::OrchestrationConfig;
pub use effect::EffectHandle;
pub use env::{EnvSignals, Quality};
pub use error::ConfigError;
pub use host::{FrameScheduler, Unsubscribe, VarScope, VisibilityEvent, VisibilityObserver};
pub use target::TargetRef;
