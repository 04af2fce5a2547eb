//! Environment signals consumed by the engine.
//!
//! Battery/FPS/idle/visibility sensing lives in a host collaborator; the
//! engine only ever reads the three derived outputs below.

use serde::{Deserialize, Serialize};

/// Animation quality level. The ordering is meaningful: `None < Low < Medium < High`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    None,
    Low,
    Medium,
    High,
}

/// Derived environment signals, updated by the host whenever its sensors change.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvSignals {
    /// False under reduced motion or equivalent hard constraints.
    pub can_animate: bool,
    pub quality: Quality,
    /// True while the host wants everything held (hidden page, user idle, ...).
    pub should_pause: bool,
}

impl EnvSignals {
    /// True when time-driven systems must apply their end state synchronously
    /// instead of animating.
    pub fn degraded(&self) -> bool {
        !self.can_animate || self.quality == Quality::None
    }
}

impl Default for EnvSignals {
    fn default() -> Self {
        Self {
            can_animate: true,
            quality: Quality::High,
            should_pause: false,
        }
    }
}
