//! Platform-neutral message types.
//!
//! Every chat line, regardless of which network it came from, is normalized
//! into a [`StandardizedMessage`] (channel messages) or a
//! [`StandardizedWhisperMessage`] (direct messages) by its platform client.
//! Everything above the client layer — matcher, gate, middleware, command
//! handlers — only ever sees these two types, usually through the
//! [`AnyMessage`] wrapper.
//!
//! Messages are created on receive (or by `reply()` on the way out) and
//! dropped once dispatch completes; nothing here is persisted.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Platform
// ============================================================================

/// A distinct chat network with its own native message format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Twitch chat (IRC-over-WebSocket with tags).
    Twitch,
    /// Discord.
    Discord,
    /// Plain IRC.
    Irc,
}

impl Platform {
    /// All known platforms, in a stable order.
    pub const ALL: [Platform; 3] = [Platform::Twitch, Platform::Discord, Platform::Irc];

    /// Returns the lowercase platform name used in keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::Discord => "discord",
            Platform::Irc => "irc",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// StandardizedMessage
// ============================================================================

/// A platform-neutral channel message.
///
/// Immutable once dispatched, except for in-flight text rewriting performed by
/// middleware (e.g. content filters) during the "send" pipeline stage.
#[derive(Debug, Clone)]
pub struct StandardizedMessage {
    /// Message text.
    pub text: String,
    /// Login/handle of the sender (`"OUTGOING"` for bot-originated replies).
    pub user: String,
    /// Channel the message was seen in or is destined for.
    pub channel: String,
    /// Originating (or target) platform.
    pub platform: Platform,
    /// Whether this message is heading out rather than coming in.
    pub outgoing: bool,
    /// Arbitrary platform metadata: badges, message ids, tags.
    pub flags: HashMap<String, serde_json::Value>,
    /// The inbound message this one replies to, if any.
    pub reply_to: Option<Box<StandardizedMessage>>,
}

impl StandardizedMessage {
    /// Creates a new inbound channel message.
    pub fn new(
        text: impl Into<String>,
        user: impl Into<String>,
        channel: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            text: text.into(),
            user: user.into(),
            channel: channel.into(),
            platform,
            outgoing: false,
            flags: HashMap::new(),
            reply_to: None,
        }
    }

    /// Creates an outgoing reply in the same channel.
    ///
    /// A leading `.` or `/` is escaped so a reply can never be interpreted as
    /// a chat command by the platform.
    pub fn reply(&self, text: impl Into<String>) -> StandardizedMessage {
        let mut text = text.into();
        if text.starts_with('.') || text.starts_with('/') {
            text.insert_str(0, "/ ");
        }
        StandardizedMessage {
            text,
            user: "OUTGOING".to_string(),
            channel: self.channel.clone(),
            platform: self.platform,
            outgoing: true,
            flags: HashMap::new(),
            reply_to: Some(Box::new(self.clone())),
        }
    }

    /// Creates an outgoing whisper addressed directly to this message's sender.
    pub fn reply_directly(&self, text: impl Into<String>) -> StandardizedWhisperMessage {
        StandardizedWhisperMessage {
            user_from: "OUTGOING".to_string(),
            user_to: self.user.clone(),
            text: text.into(),
            platform: self.platform,
            outgoing: true,
            flags: HashMap::new(),
        }
    }
}

impl fmt::Display for StandardizedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] #{} <{}> {}",
            self.platform, self.channel, self.user, self.text
        )
    }
}

// ============================================================================
// StandardizedWhisperMessage
// ============================================================================

/// A platform-neutral direct (private) message.
///
/// Addressed by `(user_from, user_to)` instead of a channel; otherwise obeys
/// the same invariants as [`StandardizedMessage`].
#[derive(Debug, Clone)]
pub struct StandardizedWhisperMessage {
    /// Sender.
    pub user_from: String,
    /// Recipient.
    pub user_to: String,
    /// Message text.
    pub text: String,
    /// Originating (or target) platform.
    pub platform: Platform,
    /// Whether this message is heading out rather than coming in.
    pub outgoing: bool,
    /// Arbitrary platform metadata.
    pub flags: HashMap<String, serde_json::Value>,
}

impl StandardizedWhisperMessage {
    /// Creates a new inbound whisper.
    pub fn new(
        user_from: impl Into<String>,
        user_to: impl Into<String>,
        text: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            user_from: user_from.into(),
            user_to: user_to.into(),
            text: text.into(),
            platform,
            outgoing: false,
            flags: HashMap::new(),
        }
    }

    /// Creates the outgoing whisper answering this one.
    pub fn reply(&self, text: impl Into<String>) -> StandardizedWhisperMessage {
        StandardizedWhisperMessage {
            user_from: self.user_to.clone(),
            user_to: self.user_from.clone(),
            text: text.into(),
            platform: self.platform,
            outgoing: true,
            flags: HashMap::new(),
        }
    }
}

impl fmt::Display for StandardizedWhisperMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {}: {}",
            self.platform, self.user_from, self.user_to, self.text
        )
    }
}

// ============================================================================
// AnyMessage
// ============================================================================

/// Either kind of standardized message.
///
/// This is the type the dispatcher, gate, and command handlers work with.
#[derive(Debug, Clone)]
pub enum AnyMessage {
    /// A channel message.
    Chat(StandardizedMessage),
    /// A direct message.
    Whisper(StandardizedWhisperMessage),
}

impl AnyMessage {
    /// Message text.
    pub fn text(&self) -> &str {
        match self {
            AnyMessage::Chat(m) => &m.text,
            AnyMessage::Whisper(m) => &m.text,
        }
    }

    /// Mutable message text (for in-flight rewriting by send middleware).
    pub fn text_mut(&mut self) -> &mut String {
        match self {
            AnyMessage::Chat(m) => &mut m.text,
            AnyMessage::Whisper(m) => &mut m.text,
        }
    }

    /// The sending user.
    pub fn user(&self) -> &str {
        match self {
            AnyMessage::Chat(m) => &m.user,
            AnyMessage::Whisper(m) => &m.user_from,
        }
    }

    /// The channel scope for this message.
    ///
    /// Whispers have no channel; the sender's name doubles as the scope key so
    /// per-channel cooldowns still apply to a whisper conversation.
    pub fn channel(&self) -> &str {
        match self {
            AnyMessage::Chat(m) => &m.channel,
            AnyMessage::Whisper(m) => &m.user_from,
        }
    }

    /// Originating platform.
    pub fn platform(&self) -> Platform {
        match self {
            AnyMessage::Chat(m) => m.platform,
            AnyMessage::Whisper(m) => m.platform,
        }
    }

    /// Returns `true` for direct messages.
    pub fn is_whisper(&self) -> bool {
        matches!(self, AnyMessage::Whisper(_))
    }

    /// Creates the outgoing message answering this one, of the same kind.
    pub fn reply(&self, text: impl Into<String>) -> AnyMessage {
        match self {
            AnyMessage::Chat(m) => AnyMessage::Chat(m.reply(text)),
            AnyMessage::Whisper(m) => AnyMessage::Whisper(m.reply(text)),
        }
    }
}

impl fmt::Display for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyMessage::Chat(m) => m.fmt(f),
            AnyMessage::Whisper(m) => m.fmt(f),
        }
    }
}

impl From<StandardizedMessage> for AnyMessage {
    fn from(m: StandardizedMessage) -> Self {
        AnyMessage::Chat(m)
    }
}

impl From<StandardizedWhisperMessage> for AnyMessage {
    fn from(m: StandardizedWhisperMessage) -> Self {
        AnyMessage::Whisper(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_escapes_leading_slash() {
        let msg = StandardizedMessage::new("!ping", "alice", "lobby", Platform::Twitch);
        let reply = msg.reply("/timeout alice 600");
        assert!(reply.text.starts_with("/ "));
        assert!(reply.outgoing);
        assert_eq!(reply.channel, "lobby");
        assert_eq!(reply.reply_to.as_deref().map(|m| m.user.as_str()), Some("alice"));
    }

    #[test]
    fn whisper_reply_swaps_addressing() {
        let w = StandardizedWhisperMessage::new("alice", "bot", "hi", Platform::Twitch);
        let reply = w.reply("hello");
        assert_eq!(reply.user_from, "bot");
        assert_eq!(reply.user_to, "alice");
        assert!(reply.outgoing);
    }

    #[test]
    fn whisper_channel_scope_is_sender() {
        let w: AnyMessage = StandardizedWhisperMessage::new("alice", "bot", "hi", Platform::Irc).into();
        assert_eq!(w.channel(), "alice");
        assert!(w.is_whisper());
    }
}
