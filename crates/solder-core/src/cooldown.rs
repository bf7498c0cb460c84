//! Cooldown policy and ledger.
//!
//! [`CommandCooldown`] is the pure per-command policy (three durations and a
//! bypass flag); the [`CooldownLedger`] holds the mutable expiry timestamps
//! keyed by `(command, scope kind, scope value)`.
//!
//! The ledger is a cache, not a source of truth: stale entries are simply
//! ignored on read and never actively reaped.  Check-and-apply runs entirely
//! under one mutex with no await in between, so a concurrent task can never
//! slip between the gate's read and its write.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::message::AnyMessage;

/// Per-command cooldown policy.
///
/// A zero duration disables that scope.  `local_bypass` controls whether a
/// channel-local bypass grant is honored when checking the cooldown-bypass
/// permission, or only a global one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCooldown {
    /// Cooldown applied per (platform, user).
    pub user: Duration,
    /// Cooldown applied per (platform, channel).
    pub channel: Duration,
    /// Cooldown applied per platform.
    pub platform: Duration,
    /// Whether a channel-local bypass grant counts toward the bypass check.
    pub local_bypass: bool,
}

impl CommandCooldown {
    /// Creates a policy from whole-second durations.
    pub fn new(user: u64, channel: u64, platform: u64) -> Self {
        Self {
            user: Duration::from_secs(user),
            channel: Duration::from_secs(channel),
            platform: Duration::from_secs(platform),
            local_bypass: true,
        }
    }

    /// Disables channel-local bypass grants for this policy.
    pub fn global_bypass_only(mut self) -> Self {
        self.local_bypass = false;
        self
    }
}

impl Default for CommandCooldown {
    /// The stock policy: 15s per user, 3s per channel, no platform cooldown.
    fn default() -> Self {
        Self::new(15, 3, 0)
    }
}

/// Which of the three cooldown scopes a ledger entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownScope {
    /// Keyed by (platform, user).
    User,
    /// Keyed by (platform, channel).
    Channel,
    /// Keyed by platform alone.
    Platform,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CooldownKey {
    command: String,
    scope: CooldownScope,
    key: String,
}

impl CooldownKey {
    fn three(command: &str, msg: &AnyMessage) -> [CooldownKey; 3] {
        let platform = msg.platform();
        [
            CooldownKey {
                command: command.to_string(),
                scope: CooldownScope::User,
                key: format!("{platform}:{}", msg.user()),
            },
            CooldownKey {
                command: command.to_string(),
                scope: CooldownScope::Channel,
                key: format!("{platform}:{}", msg.channel()),
            },
            CooldownKey {
                command: command.to_string(),
                scope: CooldownScope::Platform,
                key: platform.to_string(),
            },
        ]
    }
}

/// The mutable store of cooldown expiry timestamps.
///
/// Shared by all concurrently running command tasks via the gate.
#[derive(Default)]
pub struct CooldownLedger {
    entries: Mutex<HashMap<CooldownKey, Instant>>,
}

impl CooldownLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if any of the three scope entries for this invocation
    /// has an expiry in the future.
    pub fn is_on_cooldown(&self, command: &str, msg: &AnyMessage) -> bool {
        let now = Instant::now();
        let entries = self.entries.lock();
        CooldownKey::three(command, msg)
            .iter()
            .any(|key| entries.get(key).is_some_and(|expiry| *expiry > now))
    }

    /// Writes fresh expiries for all three scopes of this invocation.
    ///
    /// Called only after every gate check has passed; a failed permission
    /// check must never start a cooldown.
    pub fn apply(&self, command: &str, msg: &AnyMessage, cooldown: &CommandCooldown) {
        let now = Instant::now();
        let [user, channel, platform] = CooldownKey::three(command, msg);
        let mut entries = self.entries.lock();
        entries.insert(user, now + cooldown.user);
        entries.insert(channel, now + cooldown.channel);
        entries.insert(platform, now + cooldown.platform);
    }

    /// Number of recorded entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` when no entry has ever been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Platform, StandardizedMessage};

    fn msg(user: &str, channel: &str) -> AnyMessage {
        StandardizedMessage::new("!ping", user, channel, Platform::Twitch).into()
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_ignored() {
        let ledger = CooldownLedger::new();
        let m = msg("alice", "lobby");
        ledger.apply("ping", &m, &CommandCooldown::new(10, 5, 0));
        assert!(ledger.is_on_cooldown("ping", &m));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!ledger.is_on_cooldown("ping", &m));
        // Still cached, never reaped.
        assert_eq!(ledger.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_scope_hits_other_users() {
        let ledger = CooldownLedger::new();
        ledger.apply("ping", &msg("alice", "lobby"), &CommandCooldown::new(10, 5, 0));

        // Bob in the same channel is blocked by the channel scope only.
        assert!(ledger.is_on_cooldown("ping", &msg("bob", "lobby")));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!ledger.is_on_cooldown("ping", &msg("bob", "lobby")));
        // Alice herself is still inside the per-user window.
        assert!(ledger.is_on_cooldown("ping", &msg("alice", "lobby")));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_do_not_share_ledger_entries() {
        let ledger = CooldownLedger::new();
        let m = msg("alice", "lobby");
        ledger.apply("ping", &m, &CommandCooldown::default());
        assert!(!ledger.is_on_cooldown("echo", &m));
    }
}
