//! Configuration error taxonomy.
//!
//! All of these are detected before any module's setup runs and carry every
//! implicated module name, so a caller can act on the message alone.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// An active module requires another module that did not activate.
    #[error("module `{module}` requires `{requirement}`, which is not active for this configuration")]
    MissingDependency { module: String, requirement: String },

    /// Two active modules declare each other (or overlapping options) as conflicting.
    #[error("module `{module}` conflicts with active module `{other}`")]
    ModuleConflict { module: String, other: String },

    /// A module descriptor failed validation at registration time.
    #[error("invalid descriptor for module `{module}`: {reason}")]
    InvalidDescriptor { module: String, reason: String },
}
