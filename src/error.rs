//! Crate-level error types that are not tied to a single subsystem.

use thiserror::Error;

/// Errors raised while resolving configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration '{key}': {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
