//! Configuration module for the Solder runtime.
//!
//! TOML-based configuration loading (with `SOLDER_*` environment overrides)
//! and validation for logging, dispatch, platform and pub/sub settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BotConfig, ChannelEntry, LogFormat, LogOutput, LoggingConfig, PlatformConfig, PubSubSection,
    SolderConfig, SpanEventConfig, UnknownCommandConfig,
};
pub use validation::validate_config;
