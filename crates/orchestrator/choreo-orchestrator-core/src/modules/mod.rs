//! Built-in capability modules: stagger, timeline, autoplay.

mod autoplay;
mod stagger;
mod timeline;

pub use autoplay::{AutoplayModule, AutoplayOptions, AutoplaySystem};
pub use stagger::{StaggerModule, StaggerOptions, StaggerSystem};
pub use timeline::{timeline_keys, ContextDelegate, TimelineModule, TimelineSystem};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::context::{keys, SharedContext};
use choreo_timing::SharedClock;

/// Parse a module's option sub-key. Truthy scalars (the bare `true` that
/// merely activates the module) fall back to defaults; objects must parse.
pub(crate) fn parse_options<T>(options: &JsonValue, module: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if options.is_object() {
        serde_json::from_value(options.clone())
            .with_context(|| format!("invalid `{module}` options"))
    } else {
        Ok(T::default())
    }
}

/// The frame clock the session seeded before setup.
pub(crate) fn session_clock(ctx: &SharedContext) -> Result<SharedClock> {
    ctx.get(keys::CLOCK)
        .and_then(|v| v.downcast_shared::<SharedClock>())
        .map(|rc| (*rc).clone())
        .with_context(|| format!("`{}` missing from the exchange", keys::CLOCK))
}
