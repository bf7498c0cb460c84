//! Command registry and matcher.
//!
//! The registry owns every registered [`Command`] plus the prefix table, and
//! resolves which command (if any) a message invokes.  Registration order is
//! a priority order: the first matching command wins and matching stops
//! there.  Matching never mutates registry state, so repeated attempts on the
//! same message are idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::command::{Command, MatchContext};
use crate::message::{AnyMessage, Platform};

/// The stock namespace marker for administrative invocation.
pub const DEFAULT_SUBPREFIX: &str = "mb.";

/// The stock channel prefix.
pub const DEFAULT_PREFIX: &str = "!";

/// What the dispatcher does with a prefixed message no command claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownCommandPolicy {
    /// Drop it silently.
    Ignore,
    /// Log a warning.
    Warn,
    /// Answer with the given text.
    Reply(String),
}

/// The outcome of one matching pass.
#[derive(Clone)]
pub enum MatchOutcome {
    /// A command claimed the message.
    Matched(Arc<Command>),
    /// The message carried the channel prefix but no command claimed it.
    Unknown,
    /// The message does not start with the channel prefix and no
    /// forced-prefix command claimed it either.
    NoPrefix,
}

/// Holds registered commands and the per-channel/platform prefix table.
///
/// Mutation is safe concurrently with in-flight dispatch; every matching
/// pass works on a snapshot of the command list.
pub struct CommandRegistry {
    commands: RwLock<Vec<Arc<Command>>>,
    channel_prefixes: RwLock<HashMap<(String, Platform), String>>,
    platform_prefixes: RwLock<HashMap<Platform, String>>,
    default_prefix: String,
    subprefix: String,
}

impl CommandRegistry {
    /// Creates a registry with the stock prefix and namespace marker.
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    /// Creates a registry with a custom global default prefix.
    pub fn with_prefix(default_prefix: impl Into<String>) -> Self {
        Self {
            commands: RwLock::new(Vec::new()),
            channel_prefixes: RwLock::new(HashMap::new()),
            platform_prefixes: RwLock::new(HashMap::new()),
            default_prefix: default_prefix.into(),
            subprefix: DEFAULT_SUBPREFIX.to_string(),
        }
    }

    /// The namespace marker consulted by the default matcher.
    pub fn subprefix(&self) -> &str {
        &self.subprefix
    }

    /// Appends `command`.  Later registrations have lower matching priority.
    pub fn add(&self, command: Arc<Command>) {
        self.commands.write().push(command);
    }

    /// Removes the command named `name`.  Returns it if it was registered.
    pub fn remove(&self, name: &str) -> Option<Arc<Command>> {
        let mut commands = self.commands.write();
        let pos = commands.iter().position(|c| c.name() == name)?;
        Some(commands.remove(pos))
    }

    /// Looks a command up by name or alias.
    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands
            .read()
            .iter()
            .find(|c| c.name() == name || c.aliases().iter().any(|a| a == name))
            .cloned()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// A point-in-time copy of the command list, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Command>> {
        self.commands.read().clone()
    }

    // ────────────────────────────────────────────────────────────────────
    // Prefix table
    // ────────────────────────────────────────────────────────────────────

    /// Sets the prefix for one (channel, platform) pair.
    pub fn set_channel_prefix(
        &self,
        channel: impl Into<String>,
        platform: Platform,
        prefix: impl Into<String>,
    ) {
        self.channel_prefixes
            .write()
            .insert((channel.into(), platform), prefix.into());
    }

    /// Sets the platform-wide fallback prefix.
    pub fn set_platform_prefix(&self, platform: Platform, prefix: impl Into<String>) {
        self.platform_prefixes.write().insert(platform, prefix.into());
    }

    /// All configured (channel, platform) prefixes, for persistence.
    pub fn channel_prefixes(&self) -> HashMap<(String, Platform), String> {
        self.channel_prefixes.read().clone()
    }

    /// Resolves the prefix for `msg`: the (channel, platform) entry, then
    /// the platform-wide entry, then the global default.
    pub fn prefix_for(&self, msg: &AnyMessage) -> String {
        let key = (msg.channel().to_string(), msg.platform());
        if let Some(prefix) = self.channel_prefixes.read().get(&key) {
            return prefix.clone();
        }
        if let Some(prefix) = self.platform_prefixes.read().get(&msg.platform()) {
            return prefix.clone();
        }
        self.default_prefix.clone()
    }

    fn has_custom_prefix(&self, msg: &AnyMessage) -> bool {
        let key = (msg.channel().to_string(), msg.platform());
        self.channel_prefixes.read().contains_key(&key)
            // A whisper has no channel of its own; a platform-wide prefix
            // counts as its opt-out.
            || (msg.is_whisper()
                && self.platform_prefixes.read().contains_key(&msg.platform()))
    }

    // ────────────────────────────────────────────────────────────────────
    // Matching
    // ────────────────────────────────────────────────────────────────────

    /// Resolves which command `msg` invokes.
    ///
    /// Commands are tried in registration order against the resolved channel
    /// prefix.  When the message does not carry that prefix at all, a second
    /// pass checks each command's forced prefix instead.
    pub fn match_message(&self, msg: &AnyMessage) -> MatchOutcome {
        let prefix = self.prefix_for(msg);
        let ctx = MatchContext {
            subprefix: &self.subprefix,
            channel_has_custom_prefix: self.has_custom_prefix(msg),
        };
        let commands = self.snapshot();

        if msg.text().starts_with(&prefix) {
            for command in &commands {
                if command.matches(msg, &prefix, &ctx) {
                    return MatchOutcome::Matched(Arc::clone(command));
                }
            }
            return MatchOutcome::Unknown;
        }

        for command in &commands {
            if command.matches_forced(msg) {
                return MatchOutcome::Matched(Arc::clone(command));
            }
        }
        MatchOutcome::NoPrefix
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandReply;
    use crate::message::StandardizedMessage;

    fn cmd(name: &str) -> Arc<Command> {
        Command::builder(name, |_msg: AnyMessage| async { Ok(CommandReply::None) }).build()
    }

    fn msg(text: &str, channel: &str) -> AnyMessage {
        StandardizedMessage::new(text, "alice", channel, Platform::Twitch).into()
    }

    #[test]
    fn prefix_resolution_order() {
        let registry = CommandRegistry::new();
        registry.set_platform_prefix(Platform::Twitch, "?");
        registry.set_channel_prefix("lobby", Platform::Twitch, "$");

        assert_eq!(registry.prefix_for(&msg("x", "lobby")), "$");
        assert_eq!(registry.prefix_for(&msg("x", "other")), "?");

        let irc: AnyMessage =
            StandardizedMessage::new("x", "alice", "other", Platform::Irc).into();
        assert_eq!(registry.prefix_for(&irc), "!");
    }

    #[test]
    fn first_registered_match_wins() {
        let registry = CommandRegistry::new();
        registry.set_channel_prefix("lobby", Platform::Twitch, "!");
        registry.add(cmd("ping"));
        registry.add(cmd("ping"));

        let first = registry.get("ping").unwrap();
        match registry.match_message(&msg("!ping", "lobby")) {
            MatchOutcome::Matched(c) => assert!(Arc::ptr_eq(&c, &first)),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn unprefixed_messages_report_no_prefix() {
        let registry = CommandRegistry::new();
        registry.add(cmd("ping"));
        assert!(matches!(
            registry.match_message(&msg("hello there", "lobby")),
            MatchOutcome::NoPrefix
        ));
    }

    #[test]
    fn prefixed_but_unclaimed_reports_unknown() {
        let registry = CommandRegistry::new();
        registry.set_channel_prefix("lobby", Platform::Twitch, "!");
        registry.add(cmd("ping"));
        assert!(matches!(
            registry.match_message(&msg("!nosuch", "lobby")),
            MatchOutcome::Unknown
        ));
    }

    #[test]
    fn matching_is_idempotent() {
        let registry = CommandRegistry::new();
        registry.add(cmd("ping"));
        let m = msg("plain text", "lobby");
        for _ in 0..3 {
            assert!(matches!(registry.match_message(&m), MatchOutcome::NoPrefix));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn forced_prefix_pass_runs_without_channel_prefix() {
        let registry = CommandRegistry::new();
        let wiki = Command::builder("wiki", |_msg: AnyMessage| async {
            Ok(CommandReply::None)
        })
        .forced_prefix("??")
        .build();
        registry.add(wiki);

        assert!(matches!(
            registry.match_message(&msg("??wiki rust", "lobby")),
            MatchOutcome::Matched(_)
        ));
    }

    #[test]
    fn remove_unregisters_by_name() {
        let registry = CommandRegistry::new();
        registry.add(cmd("ping"));
        assert!(registry.remove("ping").is_some());
        assert!(registry.remove("ping").is_none());
        assert!(registry.is_empty());
    }
}
