//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging initialization failed.
    #[error("Logging error: {0}")]
    Logging(String),

    /// A core bot operation failed during startup or shutdown.
    #[error("Bot error: {0}")]
    Core(#[from] solder_core::CoreError),

    /// Plugin registration or teardown failed.
    #[error("Plugin '{plugin}': {message}")]
    Plugin {
        /// The plugin that failed.
        plugin: String,
        /// What went wrong.
        message: String,
    },

    /// The plugin dependency graph has a cycle.
    #[error("Plugin dependency cycle detected among: {0}")]
    PluginCycle(String),
}

impl RuntimeError {
    /// Creates a plugin error.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
