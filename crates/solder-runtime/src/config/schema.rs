//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solder_core::{Platform, UnknownCommandPolicy};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SolderConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bot-wide dispatch settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Per-platform connection settings, keyed by platform name.
    #[serde(default)]
    pub platforms: HashMap<String, PlatformConfig>,

    /// Pub/sub client settings.
    #[serde(default)]
    pub pubsub: PubSubSection,
}

// =============================================================================
// Logging
// =============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line, all fields.
    Full,
    /// Multi-line, human-oriented.
    Pretty,
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// A file; see [`LoggingConfig::file_path`].
    File,
}

/// Which span lifecycle events are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanEventConfig {
    /// No span events.
    #[default]
    None,
    /// `new` and `close` only.
    Lifecycle,
    /// `enter` and `exit` only.
    Active,
    /// Everything.
    Full,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Extra `EnvFilter` directives, e.g. `"solder_pubsub=trace"`.
    #[serde(default)]
    pub directives: Vec<String>,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Target file when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include the event target (module path).
    #[serde(default = "default_true")]
    pub with_target: bool,

    /// Include thread ids.
    #[serde(default)]
    pub with_thread_ids: bool,

    /// Include source file and line number.
    #[serde(default)]
    pub with_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directives: Vec::new(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            span_events: SpanEventConfig::default(),
            with_target: true,
            with_thread_ids: false,
            with_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Bot
// =============================================================================

/// What to do when a prefixed message matches no command.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "policy")]
pub enum UnknownCommandConfig {
    /// Stay silent.
    #[default]
    Ignore,
    /// Log a warning.
    Warn,
    /// Reply with a fixed message.
    Reply {
        /// The reply text.
        message: String,
    },
}

impl UnknownCommandConfig {
    /// Converts to the core dispatch policy.
    pub fn to_policy(&self) -> UnknownCommandPolicy {
        match self {
            Self::Ignore => UnknownCommandPolicy::Ignore,
            Self::Warn => UnknownCommandPolicy::Warn,
            Self::Reply { message } => UnknownCommandPolicy::Reply(message.clone()),
        }
    }
}

/// Bot-wide dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Default command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Unknown-command policy.
    #[serde(default)]
    pub unknown_command: UnknownCommandConfig,

    /// How long in-flight command tasks get to finish on shutdown, in seconds.
    #[serde(default = "default_task_grace_secs")]
    pub task_grace_secs: u64,

    /// Channels to join on startup, in addition to any saved state.
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            unknown_command: UnknownCommandConfig::default(),
            task_grace_secs: default_task_grace_secs(),
            channels: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Shutdown grace period as a [`Duration`].
    pub fn task_grace(&self) -> Duration {
        Duration::from_secs(self.task_grace_secs)
    }
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_task_grace_secs() -> u64 {
    10
}

/// A channel on a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Channel name.
    pub name: String,
    /// Platform the channel lives on.
    pub platform: Platform,
}

// =============================================================================
// Platforms
// =============================================================================

/// Connection settings for one chat platform.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlatformConfig {
    /// Whether the platform is connected at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Login name or bot account id.
    #[serde(default)]
    pub username: Option<String>,

    /// Credential (token, password) for the account.
    #[serde(default)]
    pub token: Option<String>,
}

// =============================================================================
// Pub/sub
// =============================================================================

/// Pub/sub client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubSection {
    /// Whether the pub/sub client runs at all.
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint URL.
    #[serde(default = "default_pubsub_url")]
    pub url: String,

    /// Seconds between keepalive pings.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Seconds before a failed connection attempt is retried.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Bearer token sent with `LISTEN` frames.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for PubSubSection {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_pubsub_url(),
            ping_interval_secs: default_ping_interval_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            auth_token: None,
        }
    }
}

fn default_pubsub_url() -> String {
    "wss://pubsub-edge.twitch.tv".to_string()
}

fn default_ping_interval_secs() -> u64 {
    15
}

fn default_reconnect_delay_secs() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: SolderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.bot.task_grace_secs, 10);
        assert!(!config.pubsub.enabled);
        assert_eq!(config.pubsub.ping_interval_secs, 15);
    }

    #[test]
    fn unknown_command_reply_carries_message() {
        let raw = r#"{"policy": "reply", "message": "No such command."}"#;
        let parsed: UnknownCommandConfig = serde_json::from_str(raw).unwrap();
        match parsed.to_policy() {
            UnknownCommandPolicy::Reply(text) => assert_eq!(text, "No such command."),
            other => panic!("unexpected policy: {other:?}"),
        }
    }

    #[test]
    fn log_format_parses_lowercase() {
        let format: LogFormat = serde_json::from_str(r#""pretty""#).unwrap();
        assert_eq!(format, LogFormat::Pretty);
    }
}
