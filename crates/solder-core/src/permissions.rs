//! Permission resolution boundary.
//!
//! The core does not own permission state; it consumes a
//! [`PermissionProvider`] that resolves the effective permission set for a
//! message's sender (user-level grants united with inherited group-level
//! grants).  Two special markers bypass every check: the global bypass and a
//! channel-local bypass scoped to one channel.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::message::AnyMessage;

/// Grants every permission everywhere.
pub const GLOBAL_BYPASS_PERMISSION: &str = "util.bypass.permission";

/// Lets the holder ignore command cooldowns.
pub const COOLDOWN_BYPASS_PERMISSION: &str = "util.no_cooldown";

/// Returns the channel-local bypass marker for `channel`.
pub fn local_bypass_permission(channel: &str) -> String {
    format!("util.bypass.permission.local.{channel}")
}

/// Resolves the effective permission set for a user.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Returns the full resolved set (user-level ∪ group-level) for the
    /// sender of `msg`.  An unknown user yields the empty set.
    async fn permission_state(&self, msg: &AnyMessage) -> HashSet<String>;
}

/// Computes which of `required` are missing from `state`.
///
/// The global bypass marker always empties the result; the channel-local
/// marker for `channel` does too, but only when `enable_local_bypass` is set —
/// commands that change global state pass `false` so a channel moderator
/// cannot reach them.
pub fn missing_permissions(
    state: &HashSet<String>,
    required: &[String],
    channel: &str,
    enable_local_bypass: bool,
) -> Vec<String> {
    if state.contains(GLOBAL_BYPASS_PERMISSION)
        || (enable_local_bypass && state.contains(&local_bypass_permission(channel)))
    {
        return Vec::new();
    }
    required
        .iter()
        .filter(|p| !state.contains(*p))
        .cloned()
        .collect()
}

/// An in-memory provider keyed by user name.
///
/// Suitable for tests and single-process deployments; real deployments back
/// this trait with their user database.
#[derive(Default)]
pub struct StaticPermissions {
    grants: RwLock<HashMap<String, HashSet<String>>>,
}

impl StaticPermissions {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `permission` to `user`.
    pub fn grant(&self, user: impl Into<String>, permission: impl Into<String>) {
        self.grants
            .write()
            .entry(user.into())
            .or_default()
            .insert(permission.into());
    }

    /// Revokes `permission` from `user`.
    pub fn revoke(&self, user: &str, permission: &str) {
        if let Some(set) = self.grants.write().get_mut(user) {
            set.remove(permission);
        }
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn permission_state(&self, msg: &AnyMessage) -> HashSet<String> {
        self.grants
            .read()
            .get(msg.user())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(perms: &[&str]) -> HashSet<String> {
        perms.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn plain_missing_permissions() {
        let missing = missing_permissions(
            &state(&["a.one"]),
            &["a.one".into(), "a.two".into()],
            "lobby",
            true,
        );
        assert_eq!(missing, vec!["a.two".to_string()]);
    }

    #[test]
    fn global_bypass_covers_everything() {
        let missing = missing_permissions(
            &state(&[GLOBAL_BYPASS_PERMISSION]),
            &["a.one".into()],
            "lobby",
            false,
        );
        assert!(missing.is_empty());
    }

    #[test]
    fn local_bypass_respects_enable_flag() {
        let s = state(&["util.bypass.permission.local.lobby"]);
        assert!(missing_permissions(&s, &["a.one".into()], "lobby", true).is_empty());
        // Local grant is ignored when the command disables local bypass.
        assert_eq!(
            missing_permissions(&s, &["a.one".into()], "lobby", false),
            vec!["a.one".to_string()]
        );
        // Grant is scoped to its channel.
        assert_eq!(
            missing_permissions(&s, &["a.one".into()], "other", true),
            vec!["a.one".to_string()]
        );
    }
}
