//! Solder Runtime - Orchestration layer for the Solder chat bot.
//!
//! This crate provides:
//! - Configuration loading and validation (`ConfigLoader`, `SolderConfig`)
//! - Logging initialization (`LoggingBuilder`)
//! - Plugin descriptors with dependency-ordered loading (`PluginManager`)
//! - The live-status bridge between pub/sub topics and the bot pipeline
//! - Runtime orchestration with signal handling (`Runtime`)
//!
//! # Quick start
//!
//! ```ignore
//! use solder_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> solder_runtime::RuntimeResult<()> {
//!     // Loads solder.toml, applies SOLDER_* overrides, initializes logging.
//!     let mut runtime = Runtime::builder()
//!         .permissions(permission_provider())
//!         .client(twitch_client())
//!         .build()?;
//!
//!     // Runs until Ctrl+C or SIGTERM.
//!     runtime.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod live;
pub mod logging;
pub mod plugin;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, SolderConfig, validate_config};
pub use error::{RuntimeError, RuntimeResult};
pub use live::LiveStatusBridge;
pub use logging::LoggingBuilder;
pub use plugin::{PluginDescriptor, PluginFn, PluginFuture, PluginManager};
pub use runtime::{Runtime, RuntimeBuilder};

// Re-export tracing for use by plugins.
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Brings in the runtime types plus the commonly used logging macros.
pub mod prelude {
    pub use crate::config::SolderConfig;
    pub use crate::plugin::{PluginDescriptor, PluginManager};
    pub use crate::runtime::Runtime;
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
