//! Target references.
//!
//! The engine never touches a real scene node or DOM element; it passes an
//! opaque string handle around and lets host adapters resolve it, the same
//! way animation track keys stay string-typed until an adapter binds them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to the element a session animates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef(pub String);

impl TargetRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
