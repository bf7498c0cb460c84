//! Cooldown & permission gate.
//!
//! Runs once per matched command, before execution.  Checks short-circuit at
//! the first failure, in a fixed order: whisper availability, channel
//! allow-list, cooldown (with a bypass permission), required permissions.
//! Only after every check passes does the gate write fresh cooldown expiries
//! and admit the invocation; a failed permission check never starts a
//! cooldown.
//!
//! The gate never returns errors.  Refusals are values ([`GateVerdict`] with
//! a non-`Ok` [`CommandOutcome`]) so the dispatcher can render different
//! user-facing text per variant or drop the event silently.

use std::sync::Arc;

use tracing::debug;

use crate::command::{Command, CommandOutcome};
use crate::cooldown::CooldownLedger;
use crate::message::AnyMessage;
use crate::middleware::{EventData, MiddlewareStack, PipelineEvent};
use crate::permissions::{COOLDOWN_BYPASS_PERMISSION, PermissionProvider, missing_permissions};

/// Refusal text for whisper-unavailable commands.
pub const NO_WHISPERS_MESSAGE: &str = "This command is not available in whispers.";

/// Sentinel "permission" reported when a middleware cancels a permission
/// check outright.
pub const EVENT_CANCELED_PERMISSION: &str = "impossible.event_canceled";

/// The gate's answer for one invocation attempt.
#[derive(Debug, Clone)]
pub struct GateVerdict {
    /// The tagged outcome.
    pub outcome: CommandOutcome,
    /// User-facing refusal text, when the refusal warrants one.
    pub reply: Option<String>,
}

impl GateVerdict {
    fn admitted() -> Self {
        Self {
            outcome: CommandOutcome::Ok,
            reply: None,
        }
    }

    fn refused(outcome: CommandOutcome, reply: Option<String>) -> Self {
        Self { outcome, reply }
    }

    /// Whether the invocation may proceed to execution.
    pub fn is_admitted(&self) -> bool {
        self.outcome == CommandOutcome::Ok
    }
}

/// The combined cooldown + permission check.
///
/// Shared by all dispatch paths; owns the ledger, consumes an injected
/// [`PermissionProvider`].
pub struct Gate {
    ledger: CooldownLedger,
    permissions: Arc<dyn PermissionProvider>,
}

impl Gate {
    /// Creates a gate backed by `permissions`.
    pub fn new(permissions: Arc<dyn PermissionProvider>) -> Self {
        Self {
            ledger: CooldownLedger::new(),
            permissions,
        }
    }

    /// The cooldown ledger.
    pub fn ledger(&self) -> &CooldownLedger {
        &self.ledger
    }

    /// Checks `msg`'s sender for `required` permissions.
    ///
    /// Fires the `permission_check` middleware event first: a middleware may
    /// cancel it (the check fails with the [`EVENT_CANCELED_PERMISSION`]
    /// sentinel) or set the event result to an array of permission names that
    /// overrides the computed missing list.  When the check fails, the
    /// `permission_error` event is fired before returning.  Pass
    /// `middleware: None` to run the bare computation with no events.
    pub async fn check_permissions(
        &self,
        msg: &AnyMessage,
        required: &[String],
        enable_local_bypass: bool,
        middleware: Option<&MiddlewareStack>,
        command: Option<&str>,
    ) -> Vec<String> {
        if let Some(stack) = middleware {
            let event = stack
                .run(PipelineEvent::cancelable(EventData::PermissionCheck {
                    message: msg.clone(),
                    permissions: required.to_vec(),
                    enable_local_bypass,
                }))
                .await;
            if event.is_canceled() {
                return vec![EVENT_CANCELED_PERMISSION.to_string()];
            }
            if let Some(serde_json::Value::Array(names)) = &event.result {
                return names
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
            }
        }

        let state = self.permissions.permission_state(msg).await;
        let missing = missing_permissions(&state, required, msg.channel(), enable_local_bypass);

        if !missing.is_empty()
            && let Some(stack) = middleware
        {
            stack
                .run(PipelineEvent::notify(EventData::PermissionError {
                    message: msg.clone(),
                    command: command.map(str::to_string),
                    missing: missing.clone(),
                }))
                .await;
        }
        missing
    }

    /// Gates one invocation of `command` by `msg`.
    ///
    /// On admission the cooldown has already been applied for all three
    /// scopes; the caller's only remaining job is to launch the handler.
    pub async fn admit(
        &self,
        command: &Command,
        msg: &AnyMessage,
        middleware: &MiddlewareStack,
    ) -> GateVerdict {
        if msg.is_whisper() && !command.available_in_whispers() {
            return GateVerdict::refused(
                CommandOutcome::Blacklisted,
                Some(NO_WHISPERS_MESSAGE.to_string()),
            );
        }

        if let Some(allowed) = command.channel_allow_list()
            && !allowed.iter().any(|c| c == msg.channel())
        {
            // Routing filter, not a user-facing error.
            return GateVerdict::refused(CommandOutcome::NotWhitelisted, None);
        }

        if self.ledger.is_on_cooldown(command.name(), msg) {
            // Bypass probe only; no middleware events fire for it.
            let missing = self
                .check_permissions(
                    msg,
                    &[COOLDOWN_BYPASS_PERMISSION.to_string()],
                    command.cooldown().local_bypass,
                    None,
                    None,
                )
                .await;
            if !missing.is_empty() {
                debug!(command = command.name(), user = msg.user(), "On cooldown");
                return GateVerdict::refused(CommandOutcome::OnCooldown, None);
            }
        }

        if !command.permissions().is_empty() {
            let missing = self
                .check_permissions(
                    msg,
                    command.permissions(),
                    command.enable_local_bypass(),
                    Some(middleware),
                    Some(command.name()),
                )
                .await;
            if !missing.is_empty() {
                return GateVerdict::refused(
                    CommandOutcome::NoPermissions(missing.clone()),
                    Some(format!("Missing permissions: {}", missing.join(", "))),
                );
            }
        }

        self.ledger.apply(command.name(), msg, command.cooldown());
        GateVerdict::admitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandReply;
    use crate::cooldown::CommandCooldown;
    use crate::message::{Platform, StandardizedMessage, StandardizedWhisperMessage};
    use crate::middleware::Middleware;
    use crate::permissions::{GLOBAL_BYPASS_PERMISSION, StaticPermissions};
    use async_trait::async_trait;
    use std::time::Duration;

    fn gate() -> (Gate, Arc<StaticPermissions>) {
        let perms = Arc::new(StaticPermissions::new());
        (
            Gate::new(Arc::clone(&perms) as Arc<dyn PermissionProvider>),
            perms,
        )
    }

    fn cmd(name: &str) -> Arc<Command> {
        Command::builder(name, |_msg: AnyMessage| async { Ok(CommandReply::None) })
            .cooldown(CommandCooldown::new(10, 5, 0))
            .build()
    }

    fn msg(user: &str) -> AnyMessage {
        StandardizedMessage::new("!ping", user, "lobby", Platform::Twitch).into()
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_within_window_is_on_cooldown() {
        let (gate, _) = gate();
        let stack = MiddlewareStack::new();
        let ping = cmd("ping");

        assert!(gate.admit(&ping, &msg("alice"), &stack).await.is_admitted());

        tokio::time::advance(Duration::from_secs(3)).await;
        let verdict = gate.admit(&ping, &msg("alice"), &stack).await;
        assert_eq!(verdict.outcome, CommandOutcome::OnCooldown);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(gate.admit(&ping, &msg("alice"), &stack).await.is_admitted());
    }

    #[tokio::test(start_paused = true)]
    async fn bypass_permission_skips_cooldown() {
        let (gate, perms) = gate();
        let stack = MiddlewareStack::new();
        let ping = cmd("ping");
        perms.grant("alice", COOLDOWN_BYPASS_PERMISSION);

        assert!(gate.admit(&ping, &msg("alice"), &stack).await.is_admitted());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.admit(&ping, &msg("alice"), &stack).await.is_admitted());
    }

    #[tokio::test]
    async fn missing_permissions_carry_names_and_skip_apply() {
        let (gate, _) = gate();
        let stack = MiddlewareStack::new();
        let quit = Command::builder("quit", |_msg: AnyMessage| async { Ok(CommandReply::None) })
            .permission("admin.quit")
            .build();

        let verdict = gate.admit(&quit, &msg("alice"), &stack).await;
        assert_eq!(
            verdict.outcome,
            CommandOutcome::NoPermissions(vec!["admin.quit".to_string()])
        );
        assert_eq!(
            verdict.reply.as_deref(),
            Some("Missing permissions: admin.quit")
        );
        // The refused attempt must not have started a cooldown.
        assert!(gate.ledger().is_empty());
    }

    #[tokio::test]
    async fn global_bypass_admits_everything() {
        let (gate, perms) = gate();
        let stack = MiddlewareStack::new();
        perms.grant("root", GLOBAL_BYPASS_PERMISSION);
        let quit = Command::builder("quit", |_msg: AnyMessage| async { Ok(CommandReply::None) })
            .permission("admin.quit")
            .build();

        assert!(gate.admit(&quit, &msg("root"), &stack).await.is_admitted());
    }

    #[tokio::test]
    async fn whispers_refused_when_disallowed() {
        let (gate, _) = gate();
        let stack = MiddlewareStack::new();
        let ping = Command::builder("ping", |_msg: AnyMessage| async { Ok(CommandReply::None) })
            .no_whispers()
            .build();
        let whisper: AnyMessage =
            StandardizedWhisperMessage::new("alice", "bot", "!ping", Platform::Twitch).into();

        let verdict = gate.admit(&ping, &whisper, &stack).await;
        assert_eq!(verdict.outcome, CommandOutcome::Blacklisted);
        assert_eq!(verdict.reply.as_deref(), Some(NO_WHISPERS_MESSAGE));
    }

    #[tokio::test]
    async fn allow_list_refuses_silently() {
        let (gate, _) = gate();
        let stack = MiddlewareStack::new();
        let ping = Command::builder("ping", |_msg: AnyMessage| async { Ok(CommandReply::None) })
            .channels(["elsewhere"])
            .build();

        let verdict = gate.admit(&ping, &msg("alice"), &stack).await;
        assert_eq!(verdict.outcome, CommandOutcome::NotWhitelisted);
        assert!(verdict.reply.is_none());
    }

    struct Vetoer;

    #[async_trait]
    impl Middleware for Vetoer {
        fn name(&self) -> &str {
            "vetoer"
        }

        async fn on_permission_check(&self, event: &mut PipelineEvent) {
            event.cancel();
        }
    }

    #[tokio::test]
    async fn canceled_permission_check_fails_closed() {
        let (gate, perms) = gate();
        let stack = MiddlewareStack::new();
        stack.push(Arc::new(Vetoer));
        perms.grant("alice", "admin.quit");
        let quit = Command::builder("quit", |_msg: AnyMessage| async { Ok(CommandReply::None) })
            .permission("admin.quit")
            .build();

        let verdict = gate.admit(&quit, &msg("alice"), &stack).await;
        assert_eq!(
            verdict.outcome,
            CommandOutcome::NoPermissions(vec![EVENT_CANCELED_PERMISSION.to_string()])
        );
    }

    struct Granter;

    #[async_trait]
    impl Middleware for Granter {
        async fn on_permission_check(&self, event: &mut PipelineEvent) {
            // Empty override list means "nothing missing".
            event.result = Some(serde_json::Value::Array(Vec::new()));
        }
    }

    #[tokio::test]
    async fn result_override_replaces_computed_missing_list() {
        let (gate, _) = gate();
        let stack = MiddlewareStack::new();
        stack.push(Arc::new(Granter));
        let quit = Command::builder("quit", |_msg: AnyMessage| async { Ok(CommandReply::None) })
            .permission("admin.quit")
            .build();

        assert!(gate.admit(&quit, &msg("alice"), &stack).await.is_admitted());
    }
}
