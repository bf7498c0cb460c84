//! Middleware pipeline.
//!
//! A [`PipelineEvent`] is constructed for each lifecycle occurrence (send,
//! receive, command, join, part, connect, disconnect, permission-check,
//! permission-error, …) and driven through every registered [`Middleware`] in
//! registration order.  Handlers are awaited strictly sequentially, never
//! concurrently, so registration order is a reliable way to express override
//! priority.
//!
//! # Cancellation
//!
//! Any middleware may cancel a cancelable event.  Cancellation does **not**
//! stop the iteration — every remaining middleware still observes the event
//! exactly once, so cross-cutting concerns such as metrics always fire — it
//! only tells the pipeline's caller to skip the primary action (actually
//! sending the message, actually running the command).  Once set, the
//! canceled flag cannot be undone by a later stage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::message::{AnyMessage, Platform};

// ============================================================================
// Events
// ============================================================================

/// The lifecycle stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A message is about to be sent.
    Send,
    /// A message was received, before command matching.
    Receive,
    /// A matched command is about to run.
    Command,
    /// The bot is about to join a channel.
    Join,
    /// The bot is about to leave a channel.
    Part,
    /// All platform clients connected.
    Connect,
    /// The bot is disconnecting.
    Disconnect,
    /// A permission check is being performed.
    PermissionCheck,
    /// A permission check failed.
    PermissionError,
    /// A command was registered.
    AddCommand,
    /// A watched channel went live or offline.
    StreamState,
}

impl EventKind {
    /// Event name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Send => "send",
            EventKind::Receive => "receive",
            EventKind::Command => "command",
            EventKind::Join => "join",
            EventKind::Part => "part",
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::PermissionCheck => "permission_check",
            EventKind::PermissionError => "permission_error",
            EventKind::AddCommand => "add_command",
            EventKind::StreamState => "stream_state",
        }
    }
}

/// Typed payload carried by a [`PipelineEvent`].
#[derive(Debug, Clone)]
pub enum EventData {
    /// Payload for [`EventKind::Send`]. The message is mutable in flight so
    /// filters can rewrite outgoing text.
    Send {
        /// The outgoing message.
        message: AnyMessage,
    },
    /// Payload for [`EventKind::Receive`].
    Receive {
        /// The inbound message.
        message: AnyMessage,
    },
    /// Payload for [`EventKind::Command`].
    Command {
        /// The triggering message.
        message: AnyMessage,
        /// Name of the matched command.
        command: String,
    },
    /// Payload for [`EventKind::Join`].
    Join {
        /// Channel being joined.
        channel: String,
        /// Platform the join targets.
        platform: Platform,
    },
    /// Payload for [`EventKind::Part`].
    Part {
        /// Channel being left.
        channel: String,
        /// Platform the part targets.
        platform: Platform,
    },
    /// Payload for [`EventKind::Connect`].
    Connect,
    /// Payload for [`EventKind::Disconnect`].
    Disconnect,
    /// Payload for [`EventKind::PermissionCheck`].
    PermissionCheck {
        /// The message whose sender is being checked.
        message: AnyMessage,
        /// The permissions being asked for.
        permissions: Vec<String>,
        /// Whether channel-local bypass grants are honored.
        enable_local_bypass: bool,
    },
    /// Payload for [`EventKind::PermissionError`].
    PermissionError {
        /// The message whose sender failed the check.
        message: AnyMessage,
        /// The command involved, if any.
        command: Option<String>,
        /// The permissions found missing.
        missing: Vec<String>,
    },
    /// Payload for [`EventKind::AddCommand`].
    AddCommand {
        /// Name of the freshly registered command.
        command: String,
    },
    /// Payload for [`EventKind::StreamState`].
    StreamState {
        /// The channel whose live state changed.
        channel: String,
        /// `true` when the channel went live.
        live: bool,
    },
}

impl EventData {
    /// The event kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventData::Send { .. } => EventKind::Send,
            EventData::Receive { .. } => EventKind::Receive,
            EventData::Command { .. } => EventKind::Command,
            EventData::Join { .. } => EventKind::Join,
            EventData::Part { .. } => EventKind::Part,
            EventData::Connect => EventKind::Connect,
            EventData::Disconnect => EventKind::Disconnect,
            EventData::PermissionCheck { .. } => EventKind::PermissionCheck,
            EventData::PermissionError { .. } => EventKind::PermissionError,
            EventData::AddCommand { .. } => EventKind::AddCommand,
            EventData::StreamState { .. } => EventKind::StreamState,
        }
    }
}

/// One lifecycle occurrence flowing through the pipeline.
///
/// Constructed fresh per occurrence, visited by every middleware, then
/// handed back to the caller and discarded.
#[derive(Debug)]
pub struct PipelineEvent {
    /// The (possibly annotated) payload.
    pub data: EventData,
    /// A terminal result value set by a middleware, if any.
    pub result: Option<serde_json::Value>,
    cancelable: bool,
    canceled: bool,
    canceled_by: Option<String>,
}

impl PipelineEvent {
    /// Creates a cancelable event.
    pub fn cancelable(data: EventData) -> Self {
        Self {
            data,
            result: None,
            cancelable: true,
            canceled: false,
            canceled_by: None,
        }
    }

    /// Creates a notify-only event that cannot be canceled.
    pub fn notify(data: EventData) -> Self {
        Self {
            data,
            result: None,
            cancelable: false,
            canceled: false,
            canceled_by: None,
        }
    }

    /// The lifecycle stage of this event.
    pub fn kind(&self) -> EventKind {
        self.data.kind()
    }

    /// Whether this event may be canceled at all.
    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    /// Whether a middleware canceled this event.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Name of the first middleware that canceled the event.
    pub fn canceled_by(&self) -> Option<&str> {
        self.canceled_by.as_deref()
    }

    /// Cancels the event.  A no-op on non-cancelable events; once set the
    /// flag cannot be cleared by later stages.
    pub fn cancel(&mut self) {
        if self.cancelable {
            self.canceled = true;
        }
    }

    fn record_canceler(&mut self, name: &str) {
        if self.canceled && self.canceled_by.is_none() {
            self.canceled_by = Some(name.to_string());
        }
    }
}

// ============================================================================
// Middleware trait
// ============================================================================

/// An observer attached to the dispatch pipeline.
///
/// Each handler defaults to a no-op; a middleware implements only the
/// lifecycle stages it cares about.  Handlers may suspend freely — the
/// pipeline driver awaits each one in turn.
#[allow(unused_variables)]
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &str {
        "middleware"
    }

    /// A message is about to be sent.
    async fn on_send(&self, event: &mut PipelineEvent) {}

    /// A message was received.
    async fn on_receive(&self, event: &mut PipelineEvent) {}

    /// A matched command is about to run.
    async fn on_command(&self, event: &mut PipelineEvent) {}

    /// The bot is about to join a channel.
    async fn on_join(&self, event: &mut PipelineEvent) {}

    /// The bot is about to leave a channel.
    async fn on_part(&self, event: &mut PipelineEvent) {}

    /// All platform clients connected.
    async fn on_connect(&self, event: &mut PipelineEvent) {}

    /// The bot is disconnecting.
    async fn on_disconnect(&self, event: &mut PipelineEvent) {}

    /// A permission check is being performed.  Cancel to fail the check, or
    /// set `result` to an array of permission names to override its outcome.
    async fn on_permission_check(&self, event: &mut PipelineEvent) {}

    /// A permission check failed.
    async fn on_permission_error(&self, event: &mut PipelineEvent) {}

    /// A command was registered with the bot.
    async fn on_add_command(&self, event: &mut PipelineEvent) {}

    /// A watched channel went live or offline.
    async fn on_stream_state(&self, event: &mut PipelineEvent) {}
}

async fn invoke(mw: &dyn Middleware, event: &mut PipelineEvent) {
    match event.kind() {
        EventKind::Send => mw.on_send(event).await,
        EventKind::Receive => mw.on_receive(event).await,
        EventKind::Command => mw.on_command(event).await,
        EventKind::Join => mw.on_join(event).await,
        EventKind::Part => mw.on_part(event).await,
        EventKind::Connect => mw.on_connect(event).await,
        EventKind::Disconnect => mw.on_disconnect(event).await,
        EventKind::PermissionCheck => mw.on_permission_check(event).await,
        EventKind::PermissionError => mw.on_permission_error(event).await,
        EventKind::AddCommand => mw.on_add_command(event).await,
        EventKind::StreamState => mw.on_stream_state(event).await,
    }
}

// ============================================================================
// MiddlewareStack
// ============================================================================

/// The ordered list of registered middleware.
///
/// Mutation is safe while dispatch is in flight: every pipeline run operates
/// on a snapshot of the list taken at its start.
#[derive(Default)]
pub struct MiddlewareStack {
    list: parking_lot::RwLock<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.  Order of registration is visiting order.
    pub fn push(&self, mw: Arc<dyn Middleware>) {
        self.list.write().push(mw);
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.list.read().len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.list.read().clone()
    }

    /// Drives `event` through every registered middleware and returns it.
    ///
    /// Each middleware is visited exactly once, in registration order, even
    /// after the event has been canceled.  The caller inspects
    /// [`PipelineEvent::is_canceled`] to decide whether to perform the
    /// primary action, and reads the payload back out for any in-flight
    /// annotations.
    pub async fn run(&self, mut event: PipelineEvent) -> PipelineEvent {
        let stack = self.snapshot();
        trace!(
            event = event.kind().as_str(),
            middleware_count = stack.len(),
            "Running pipeline"
        );

        for mw in &stack {
            invoke(mw.as_ref(), &mut event).await;
            event.record_canceler(mw.name());
        }

        if event.is_canceled() {
            debug!(
                event = event.kind().as_str(),
                canceled_by = event.canceled_by().unwrap_or("unknown"),
                "Event canceled"
            );
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Platform, StandardizedMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Middleware for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn on_send(&self, _event: &mut PipelineEvent) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Blocker {
        phrase: &'static str,
    }

    #[async_trait]
    impl Middleware for Blocker {
        fn name(&self) -> &str {
            "blocker"
        }

        async fn on_send(&self, event: &mut PipelineEvent) {
            if let EventData::Send { message } = &event.data
                && message.text().contains(self.phrase)
            {
                event.cancel();
            }
        }
    }

    fn send_event(text: &str) -> PipelineEvent {
        PipelineEvent::cancelable(EventData::Send {
            message: StandardizedMessage::new(text, "OUTGOING", "lobby", Platform::Twitch).into(),
        })
    }

    #[tokio::test]
    async fn cancellation_does_not_stop_iteration() {
        let stack = MiddlewareStack::new();
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        stack.push(Arc::new(Counter { seen: Arc::clone(&before) }));
        stack.push(Arc::new(Blocker { phrase: "banned" }));
        stack.push(Arc::new(Counter { seen: Arc::clone(&after) }));

        let event = stack.run(send_event("this is banned text")).await;

        assert!(event.is_canceled());
        assert_eq!(event.canceled_by(), Some("blocker"));
        // Both counters fired exactly once despite the cancellation.
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clean_messages_pass_through() {
        let stack = MiddlewareStack::new();
        stack.push(Arc::new(Blocker { phrase: "banned" }));

        let event = stack.run(send_event("all good")).await;
        assert!(!event.is_canceled());
        assert!(event.canceled_by().is_none());
    }

    #[tokio::test]
    async fn notify_events_cannot_be_canceled() {
        let mut event = PipelineEvent::notify(EventData::Connect);
        event.cancel();
        assert!(!event.is_canceled());
    }

    struct Rewriter;

    #[async_trait]
    impl Middleware for Rewriter {
        async fn on_send(&self, event: &mut PipelineEvent) {
            if let EventData::Send { message } = &mut event.data {
                *message.text_mut() = message.text().replace("rude", "[redacted]");
            }
        }
    }

    #[tokio::test]
    async fn middleware_can_rewrite_outgoing_text() {
        let stack = MiddlewareStack::new();
        stack.push(Arc::new(Rewriter));

        let event = stack.run(send_event("that was rude")).await;
        let EventData::Send { message } = &event.data else {
            panic!("payload kind changed");
        };
        assert_eq!(message.text(), "that was [redacted]");
    }
}
