//! Unified error types for the shutdown coordinator.

use thiserror::Error;

/// Top-level error type for the `graceful` crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Arming the signal bridge requires a running tokio runtime.
    #[error("no tokio runtime: the signal bridge must be armed from within a runtime context")]
    NoRuntime,

    /// OS signal registration failed.
    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),

    /// Configuration file could not be resolved, read, or parsed.
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Builds an [`Error::Config`] from a message and its underlying cause.
    pub fn config_with(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Config(format!("{}: {cause}", message.into()))
    }
}
