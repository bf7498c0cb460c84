//! Command descriptions.
//!
//! A [`Command`] bundles a handler with its matching rules and gate policy:
//! aliases, required permissions, cooldown, channel allow-list, whisper
//! availability, an optional forced prefix and an optional custom matcher
//! predicate.  Commands are built with [`Command::builder`], registered once
//! at startup or plugin-load time, and owned by the registry for their whole
//! lifetime.
//!
//! # Examples
//!
//! ```
//! use solder_core::command::{Command, CommandReply};
//!
//! let ping = Command::builder("ping", |_msg| async {
//!     Ok(CommandReply::Text("pong!".to_string()))
//! })
//! .alias("p")
//! .build();
//! assert_eq!(ping.name(), "ping");
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::cooldown::CommandCooldown;
use crate::error::BoxError;
use crate::message::AnyMessage;

// ============================================================================
// Outcomes and replies
// ============================================================================

/// The tagged result of gating (and possibly running) a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// All gate checks passed.
    Ok,
    /// A cooldown scope is still active.
    OnCooldown,
    /// Required permissions are missing; carries their names for display.
    NoPermissions(Vec<String>),
    /// The command restricts itself to channels this message is not in.
    NotWhitelisted,
    /// The caller is blocked outright.
    Blacklisted,
    /// Any other refusal (e.g. not available in whispers).
    OtherFailed,
}

impl CommandOutcome {
    /// Short tag used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOutcome::Ok => "ok",
            CommandOutcome::OnCooldown => "on_cooldown",
            CommandOutcome::NoPermissions(_) => "no_permissions",
            CommandOutcome::NotWhitelisted => "not_whitelisted",
            CommandOutcome::Blacklisted => "blacklisted",
            CommandOutcome::OtherFailed => "other_failed",
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler hands back to the supervisor.
#[derive(Debug, Clone)]
pub enum CommandReply {
    /// Nothing to send.
    None,
    /// A single reply in the originating channel.
    Text(String),
    /// Multiple fully-formed messages, sent in order.
    Messages(Vec<AnyMessage>),
    /// A reply paired with an outcome tag; non-`Ok` tags may be suppressed
    /// per channel configuration.
    Tagged(CommandOutcome, String),
}

// ============================================================================
// Handler trait
// ============================================================================

/// A command body.
///
/// Always treated as asynchronous by the supervisor; synchronous logic simply
/// returns a ready future.  Implemented for free by any
/// `Fn(AnyMessage) -> impl Future<Output = Result<CommandReply, BoxError>>`.
pub trait CommandHandler: Send + Sync {
    /// Runs the command for `msg`.
    fn handle(&self, msg: AnyMessage) -> BoxFuture<'static, Result<CommandReply, BoxError>>;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(AnyMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CommandReply, BoxError>> + Send + 'static,
{
    fn handle(&self, msg: AnyMessage) -> BoxFuture<'static, Result<CommandReply, BoxError>> {
        Box::pin(self(msg))
    }
}

/// A custom matcher predicate, given the message and the resolved channel
/// prefix.
pub type MatcherFn = dyn Fn(&AnyMessage, &str) -> bool + Send + Sync;

// ============================================================================
// Command
// ============================================================================

/// Registry-wide settings the default matcher consults.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// The namespace marker (e.g. `"mb."`) for sub-prefixed invocation.
    pub subprefix: &'a str,
    /// Whether the channel carries an explicitly configured prefix, which
    /// opts it out of the namespace requirement.
    pub channel_has_custom_prefix: bool,
}

/// One registered chat command.
pub struct Command {
    name: String,
    aliases: Vec<String>,
    handler: Arc<dyn CommandHandler>,
    permissions: Vec<String>,
    cooldown: CommandCooldown,
    matcher: Option<Box<MatcherFn>>,
    channel_allow_list: Option<Vec<String>>,
    available_in_whispers: bool,
    forced_prefix: Option<String>,
    enable_local_bypass: bool,
}

impl Command {
    /// Starts building a command with `name` and `handler`.
    pub fn builder(name: impl Into<String>, handler: impl CommandHandler + 'static) -> CommandBuilder {
        CommandBuilder {
            command: Command {
                name: name.into(),
                aliases: Vec::new(),
                handler: Arc::new(handler),
                permissions: Vec::new(),
                cooldown: CommandCooldown::default(),
                matcher: None,
                channel_allow_list: None,
                available_in_whispers: true,
                forced_prefix: None,
                enable_local_bypass: true,
            },
        }
    }

    /// Chat command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alternate invocation names.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Permissions the caller must hold.
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// The cooldown policy.
    pub fn cooldown(&self) -> &CommandCooldown {
        &self.cooldown
    }

    /// Channels this command restricts itself to, if any.
    pub fn channel_allow_list(&self) -> Option<&[String]> {
        self.channel_allow_list.as_deref()
    }

    /// Whether the command may be invoked from a whisper.
    pub fn available_in_whispers(&self) -> bool {
        self.available_in_whispers
    }

    /// The command-specific trigger prefix checked when the channel prefix
    /// did not match, if any.
    pub fn forced_prefix(&self) -> Option<&str> {
        self.forced_prefix.as_deref()
    }

    /// Whether channel-local bypass grants satisfy this command's permission
    /// and cooldown-bypass checks.
    pub fn enable_local_bypass(&self) -> bool {
        self.enable_local_bypass
    }

    /// The handler, for the supervisor to launch.
    pub fn handler(&self) -> Arc<dyn CommandHandler> {
        Arc::clone(&self.handler)
    }

    /// Whether `msg` invokes this command under the channel's `prefix`.
    ///
    /// A custom matcher predicate replaces the default rules entirely.  The
    /// default accepts `prefix + name` (or an alias) followed by a space or
    /// end of string; names carrying the namespace marker additionally match
    /// their bare form, and every command matches its namespaced form
    /// `prefix + marker + name` unless the channel opted out of the marker
    /// via an explicitly configured prefix.
    pub fn matches(&self, msg: &AnyMessage, prefix: &str, ctx: &MatchContext<'_>) -> bool {
        if let Some(matcher) = &self.matcher {
            return matcher(msg, prefix);
        }
        let text = msg.text();
        let Some(rest) = text.strip_prefix(prefix) else {
            return false;
        };
        self.names().any(|name| {
            if Self::is_invocation(rest, name) {
                // Bare invocation is only honored where the channel opted out
                // of the namespace marker, or for names that carry it anyway.
                return ctx.channel_has_custom_prefix || name.starts_with(ctx.subprefix);
            }
            Self::is_invocation(rest, &format!("{}{}", ctx.subprefix, name))
        })
    }

    /// Whether `msg` invokes this command through its forced prefix.
    ///
    /// Checked only when the message does not start with the channel prefix.
    pub fn matches_forced(&self, msg: &AnyMessage) -> bool {
        let Some(forced) = &self.forced_prefix else {
            return false;
        };
        let text = msg.text();
        let Some(rest) = text.strip_prefix(forced.as_str()) else {
            return false;
        };
        self.names().any(|name| Self::is_invocation(rest, name))
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    fn is_invocation(rest: &str, name: &str) -> bool {
        match rest.strip_prefix(name) {
            Some(tail) => tail.is_empty() || tail.starts_with(' '),
            None => false,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("permissions", &self.permissions)
            .field("cooldown", &self.cooldown)
            .field("forced_prefix", &self.forced_prefix)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`Command::builder`].
pub struct CommandBuilder {
    command: Command,
}

impl CommandBuilder {
    /// Adds an alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.command.aliases.push(alias.into());
        self
    }

    /// Requires `permission` of the caller.
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.command.permissions.push(permission.into());
        self
    }

    /// Sets the cooldown policy.
    pub fn cooldown(mut self, cooldown: CommandCooldown) -> Self {
        self.command.cooldown = cooldown;
        self
    }

    /// Replaces the default matching rules with a custom predicate.
    pub fn matcher(
        mut self,
        matcher: impl Fn(&AnyMessage, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.command.matcher = Some(Box::new(matcher));
        self
    }

    /// Restricts the command to the given channels.
    pub fn channels(mut self, channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command.channel_allow_list = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    /// Disallows invocation from whispers.
    pub fn no_whispers(mut self) -> Self {
        self.command.available_in_whispers = false;
        self
    }

    /// Sets a command-specific trigger prefix checked when the channel
    /// prefix did not match at all.
    pub fn forced_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command.forced_prefix = Some(prefix.into());
        self
    }

    /// Ignores channel-local bypass grants for this command.
    pub fn global_bypass_only(mut self) -> Self {
        self.command.enable_local_bypass = false;
        self.command.cooldown.local_bypass = false;
        self
    }

    /// Finishes the command.
    pub fn build(self) -> Arc<Command> {
        Arc::new(self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Platform, StandardizedMessage};

    fn msg(text: &str) -> AnyMessage {
        StandardizedMessage::new(text, "alice", "lobby", Platform::Twitch).into()
    }

    fn noop() -> impl CommandHandler {
        |_msg: AnyMessage| async { Ok(CommandReply::None) }
    }

    const OPTED_OUT: MatchContext<'_> = MatchContext {
        subprefix: "mb.",
        channel_has_custom_prefix: true,
    };

    const ENFORCED: MatchContext<'_> = MatchContext {
        subprefix: "mb.",
        channel_has_custom_prefix: false,
    };

    #[test]
    fn direct_match_requires_boundary() {
        let cmd = Command::builder("ping", noop()).build();
        assert!(cmd.matches(&msg("!ping"), "!", &OPTED_OUT));
        assert!(cmd.matches(&msg("!ping with args"), "!", &OPTED_OUT));
        assert!(!cmd.matches(&msg("!pingpong"), "!", &OPTED_OUT));
        assert!(!cmd.matches(&msg("ping"), "!", &OPTED_OUT));
    }

    #[test]
    fn aliases_match_like_names() {
        let cmd = Command::builder("ping", noop()).alias("p").build();
        assert!(cmd.matches(&msg("!p"), "!", &OPTED_OUT));
        assert!(!cmd.matches(&msg("!pong"), "!", &OPTED_OUT));
    }

    #[test]
    fn namespace_enforced_unless_opted_out() {
        let cmd = Command::builder("reload", noop()).build();
        // The namespaced form always works.
        assert!(cmd.matches(&msg("!mb.reload"), "!", &ENFORCED));
        assert!(cmd.matches(&msg("!mb.reload"), "!", &OPTED_OUT));
        // Bare form only where the channel configured its own prefix.
        assert!(!cmd.matches(&msg("!reload"), "!", &ENFORCED));
        assert!(cmd.matches(&msg("!reload"), "!", &OPTED_OUT));
    }

    #[test]
    fn namespaced_name_matches_bare_everywhere() {
        let cmd = Command::builder("mb.quit", noop()).build();
        assert!(cmd.matches(&msg("!mb.quit"), "!", &ENFORCED));
    }

    #[test]
    fn forced_prefix_ignores_channel_prefix() {
        let cmd = Command::builder("wiki", noop()).forced_prefix("??").build();
        assert!(cmd.matches_forced(&msg("??wiki rust")));
        assert!(!cmd.matches_forced(&msg("!wiki rust")));
        let plain = Command::builder("wiki", noop()).build();
        assert!(!plain.matches_forced(&msg("??wiki rust")));
    }

    #[test]
    fn custom_matcher_replaces_default_rules() {
        let cmd = Command::builder("shout", noop())
            .matcher(|m, _prefix| m.text().chars().all(|c| !c.is_lowercase()))
            .build();
        assert!(cmd.matches(&msg("HELLO THERE"), "!", &ENFORCED));
        assert!(!cmd.matches(&msg("hello there"), "!", &ENFORCED));
    }
}
