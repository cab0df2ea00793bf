//! Configuration resolved from the environment.
//!
//! Values come from process env vars, with a `.env` file in the working
//! directory loaded first by the binary. Every key has a default, so an
//! empty environment yields a working on-demand setup.

mod helpers;
mod inspector;

pub use inspector::InspectorConfig;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub inspector: InspectorConfig,
}

impl Config {
    /// Resolve configuration from env vars.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            inspector: InspectorConfig::resolve()?,
        })
    }
}
