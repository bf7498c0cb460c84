//! Bot core.
//!
//! [`Bot`] owns the command registry, the middleware stack, the gate, the
//! task supervisor and the platform clients, and drives the per-platform
//! receive loops.  It is the explicit context object handed to every plugin
//! entry point; there is no ambient global state.
//!
//! Dispatch path for one inbound message: lifecycle hooks fire, the
//! "receive" middleware event runs (cancelable, may rewrite the text), the
//! matcher resolves a command, the gate checks whisper availability, the
//! channel allow-list, cooldowns and permissions, the "command" middleware
//! event runs, and the handler is launched on the supervisor.  Replies come
//! back through [`Bot::send`], which runs the "send" middleware event before
//! handing the message to the platform client.
//!
//! `Bot` is a cheap clone over shared state; the receive loops, the
//! supervisor worker and plugin callbacks all hold their own clones.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::PlatformClient;
use crate::command::{Command, CommandOutcome, CommandReply};
use crate::error::{BoxError, CoreError, CoreResult};
use crate::gate::{Gate, GateVerdict};
use crate::message::{AnyMessage, Platform};
use crate::middleware::{EventData, Middleware, MiddlewareStack, PipelineEvent};
use crate::permissions::PermissionProvider;
use crate::registry::{CommandRegistry, MatchOutcome, UnknownCommandPolicy};
use crate::storage::{CHANNELS_KEY, MemoryStorage, PREFIXES_KEY, Storage, storage_error};
use crate::supervisor::{ReplyRouter, Supervisor, TaskMeta};

/// Reply sent when a command handler fails.
pub const HANDLER_ERROR_REPLY: &str =
    "Something went wrong while running that command. Please try again later.";

const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Lifecycle hooks
// ============================================================================

/// An ordered list of plain async callbacks for one lifecycle event.
pub struct HookList<A> {
    list: RwLock<Vec<Arc<dyn Fn(A) -> BoxFuture<'static, ()> + Send + Sync>>>,
}

impl<A: Clone> HookList<A> {
    /// Appends a callback.
    pub fn append<F, Fut>(&self, hook: F)
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.list.write().push(Arc::new(move |arg| Box::pin(hook(arg))));
    }

    /// Calls every callback in order with a clone of `arg`.
    pub async fn fire(&self, arg: A) {
        let hooks = self.list.read().clone();
        for hook in &hooks {
            hook(arg.clone()).await;
        }
    }
}

impl<A> Default for HookList<A> {
    fn default() -> Self {
        Self {
            list: RwLock::new(Vec::new()),
        }
    }
}

/// Arguments delivered to `permission_error` hooks.
#[derive(Debug, Clone)]
pub struct PermissionErrorArgs {
    /// The message whose sender failed the check.
    pub message: AnyMessage,
    /// The command involved, if any.
    pub command: Option<String>,
    /// The permissions found missing.
    pub missing: Vec<String>,
}

/// Named lifecycle handler lists plugins may append callbacks to.
#[derive(Default)]
pub struct Hooks {
    /// Every inbound channel message.
    pub chat_msg: HookList<AnyMessage>,
    /// Every inbound message, whispers included.
    pub any_msg: HookList<AnyMessage>,
    /// The bot finished connecting and is about to start receiving.
    pub start: HookList<()>,
    /// Fired before the clients disconnect.
    pub pre_disconnect: HookList<()>,
    /// Fired after the clients disconnected.
    pub post_disconnect: HookList<()>,
    /// Fired before state is saved.
    pub pre_save: HookList<()>,
    /// Fired after state was saved.
    pub post_save: HookList<()>,
    /// A permission check failed.
    pub permission_error: HookList<PermissionErrorArgs>,
}

/// Injectable handler for command failures, called with the error and the
/// failed invocation before the generic failure reply is sent.
pub type CommandErrorHandler =
    Arc<dyn Fn(BoxError, TaskMeta) -> BoxFuture<'static, ()> + Send + Sync>;

// ============================================================================
// Bot
// ============================================================================

struct BotInner {
    registry: CommandRegistry,
    middleware: MiddlewareStack,
    gate: Gate,
    storage: Arc<dyn Storage>,
    clients: RwLock<HashMap<Platform, Arc<dyn PlatformClient>>>,
    channels: RwLock<Vec<(Platform, String)>>,
    hooks: Hooks,
    unknown_command_policy: RwLock<UnknownCommandPolicy>,
    no_permissions_message: RwLock<HashSet<(String, Platform)>>,
    error_handler: RwLock<Option<CommandErrorHandler>>,
    supervisor: Supervisor,
    shutdown: CancellationToken,
    loops: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

/// The bot context object.  Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

/// Configures and creates a [`Bot`].
pub struct BotBuilder {
    permissions: Option<Arc<dyn PermissionProvider>>,
    storage: Option<Arc<dyn Storage>>,
    prefix: String,
    unknown_command_policy: UnknownCommandPolicy,
    task_grace: Duration,
}

impl BotBuilder {
    /// Sets the permission provider.  Required.
    pub fn permissions(mut self, provider: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(provider);
        self
    }

    /// Sets the persistence backend.  Defaults to in-memory storage.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the global default command prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets what happens to prefixed messages no command claims.
    pub fn unknown_command_policy(mut self, policy: UnknownCommandPolicy) -> Self {
        self.unknown_command_policy = policy;
        self
    }

    /// Bounds how long in-flight command tasks may run after shutdown.
    pub fn task_grace(mut self, grace: Duration) -> Self {
        self.task_grace = grace;
        self
    }

    /// Creates the bot and starts its supervisor worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> CoreResult<Bot> {
        let permissions = self
            .permissions
            .ok_or_else(|| CoreError::Setup("a permission provider is required".to_string()))?;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let shutdown = CancellationToken::new();

        let inner = Arc::new_cyclic(|weak: &Weak<BotInner>| BotInner {
            registry: CommandRegistry::with_prefix(self.prefix),
            middleware: MiddlewareStack::new(),
            gate: Gate::new(permissions),
            storage,
            clients: RwLock::new(HashMap::new()),
            channels: RwLock::new(Vec::new()),
            hooks: Hooks::default(),
            unknown_command_policy: RwLock::new(self.unknown_command_policy),
            no_permissions_message: RwLock::new(HashSet::new()),
            error_handler: RwLock::new(None),
            supervisor: Supervisor::start(
                Arc::new(BotRouter { bot: weak.clone() }),
                shutdown.clone(),
                self.task_grace,
            ),
            shutdown,
            loops: parking_lot::Mutex::new(Vec::new()),
        });
        Ok(Bot { inner })
    }
}

impl Bot {
    /// Starts building a bot.
    pub fn builder() -> BotBuilder {
        BotBuilder {
            permissions: None,
            storage: None,
            prefix: crate::registry::DEFAULT_PREFIX.to_string(),
            unknown_command_policy: UnknownCommandPolicy::Ignore,
            task_grace: Duration::from_secs(10),
        }
    }

    /// The command registry.
    pub fn registry(&self) -> &CommandRegistry {
        &self.inner.registry
    }

    /// The middleware stack.
    pub fn middleware(&self) -> &MiddlewareStack {
        &self.inner.middleware
    }

    /// The cooldown & permission gate.
    pub fn gate(&self) -> &Gate {
        &self.inner.gate
    }

    /// The persistence backend.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    /// The lifecycle hook lists.
    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    /// The shutdown token shared with all internal loops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Channels the bot is currently joined to.
    pub fn channels(&self) -> Vec<(Platform, String)> {
        self.inner.channels.read().clone()
    }

    /// Installs the platform client for its platform.
    pub fn add_client(&self, client: Arc<dyn PlatformClient>) {
        self.inner.clients.write().insert(client.platform(), client);
    }

    /// Registers a command and fires the `add_command` middleware event.
    pub async fn add_command(&self, command: Arc<Command>) {
        info!(command = command.name(), "Registering command");
        let name = command.name().to_string();
        self.inner.registry.add(command);
        self.inner
            .middleware
            .run(PipelineEvent::notify(EventData::AddCommand { command: name }))
            .await;
    }

    /// Appends a middleware to the pipeline.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner.middleware.push(middleware);
    }

    /// Installs the injectable command-failure handler.
    pub fn set_error_handler(&self, handler: CommandErrorHandler) {
        *self.inner.error_handler.write() = Some(handler);
    }

    /// Replaces the unknown-command policy.
    pub fn set_unknown_command_policy(&self, policy: UnknownCommandPolicy) {
        *self.inner.unknown_command_policy.write() = policy;
    }

    /// Lets refused-permission replies through in `channel`.
    pub fn enable_no_permissions_message(&self, channel: impl Into<String>, platform: Platform) {
        self.inner
            .no_permissions_message
            .write()
            .insert((channel.into(), platform));
    }

    fn client(&self, platform: Platform) -> CoreResult<Arc<dyn PlatformClient>> {
        self.inner
            .clients
            .read()
            .get(&platform)
            .cloned()
            .ok_or(CoreError::NoClient { platform })
    }

    // ────────────────────────────────────────────────────────────────────
    // Sending
    // ────────────────────────────────────────────────────────────────────

    /// Sends a message through the "send" middleware stage and the platform
    /// client.
    ///
    /// A canceled send event drops the message silently.  A dead connection
    /// is reconnected and the send retried once.
    pub async fn send(&self, msg: AnyMessage) -> CoreResult<()> {
        let event = self
            .inner
            .middleware
            .run(PipelineEvent::cancelable(EventData::Send { message: msg }))
            .await;
        let canceled = event.is_canceled();
        let EventData::Send { message } = event.data else {
            return Ok(());
        };
        if canceled {
            debug!(message = %message, "Send canceled by middleware");
            return Ok(());
        }

        let platform = message.platform();
        let client = self.client(platform)?;
        match client.send(message.clone()).await {
            Ok(()) => Ok(()),
            Err(CoreError::Reconnect { .. }) => {
                warn!(%platform, "Connection dead on send; reconnecting");
                client.reconnect().await?;
                client
                    .send(message)
                    .await
                    .map_err(|_| CoreError::ResendFailed { platform })
            }
            Err(other) => Err(other),
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Channel membership
    // ────────────────────────────────────────────────────────────────────

    /// Joins `channel` on `platform`, unless a middleware cancels the join.
    pub async fn join(&self, channel: &str, platform: Platform) -> CoreResult<()> {
        let channel = channel.trim_start_matches('#').to_lowercase();
        let event = self
            .inner
            .middleware
            .run(PipelineEvent::cancelable(EventData::Join {
                channel: channel.clone(),
                platform,
            }))
            .await;
        if event.is_canceled() {
            return Ok(());
        }
        self.client(platform)?.join(&channel).await?;
        let mut channels = self.inner.channels.write();
        if !channels.contains(&(platform, channel.clone())) {
            channels.push((platform, channel));
        }
        Ok(())
    }

    /// Leaves `channel` on `platform`, unless a middleware cancels the part.
    pub async fn part(&self, channel: &str, platform: Platform) -> CoreResult<()> {
        let channel = channel.trim_start_matches('#').to_lowercase();
        let event = self
            .inner
            .middleware
            .run(PipelineEvent::cancelable(EventData::Part {
                channel: channel.clone(),
                platform,
            }))
            .await;
        if event.is_canceled() {
            return Ok(());
        }
        self.client(platform)?.part(&channel).await?;
        self.inner
            .channels
            .write()
            .retain(|entry| entry != &(platform, channel.clone()));
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Loads persisted state, connects every client, rejoins saved channels
    /// and spawns the receive and flush loops.
    pub async fn start(&self) -> CoreResult<()> {
        self.load_state().await?;

        let clients: Vec<_> = self.inner.clients.read().values().cloned().collect();
        for client in &clients {
            info!(platform = %client.platform(), "Connecting");
            client.connect().await?;
        }
        self.inner
            .middleware
            .run(PipelineEvent::notify(EventData::Connect))
            .await;
        self.inner.hooks.start.fire(()).await;

        for (platform, channel) in self.channels() {
            if let Err(error) = self.join(&channel, platform).await {
                warn!(%platform, channel, %error, "Failed to rejoin saved channel");
            }
        }

        let mut loops = self.inner.loops.lock();
        for client in clients {
            loops.push(tokio::spawn(receive_loop(
                self.clone(),
                Arc::clone(&client),
                self.inner.shutdown.clone(),
            )));
            loops.push(tokio::spawn(flush_loop(
                client,
                self.inner.shutdown.clone(),
            )));
        }
        Ok(())
    }

    /// Stops the bot: cancels the loops, saves state, disconnects the
    /// clients and drains the supervisor.
    pub async fn stop(&self) -> CoreResult<()> {
        info!("Stopping bot");
        self.inner.shutdown.cancel();
        let loops: Vec<_> = self.inner.loops.lock().drain(..).collect();
        for handle in loops {
            let _ = handle.await;
        }

        self.inner.hooks.pre_save.fire(()).await;
        self.save_state().await?;
        self.inner.hooks.post_save.fire(()).await;

        self.disconnect().await?;
        self.inner.supervisor.wait().await;
        Ok(())
    }

    async fn disconnect(&self) -> CoreResult<()> {
        self.inner.hooks.pre_disconnect.fire(()).await;
        self.inner
            .middleware
            .run(PipelineEvent::notify(EventData::Disconnect))
            .await;
        let clients: Vec<_> = self.inner.clients.read().values().cloned().collect();
        for client in clients {
            if let Err(error) = client.disconnect().await {
                warn!(platform = %client.platform(), %error, "Disconnect failed");
            }
        }
        self.inner.hooks.post_disconnect.fire(()).await;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Dispatch
    // ────────────────────────────────────────────────────────────────────

    async fn handle_message(&self, msg: AnyMessage) {
        self.inner.hooks.any_msg.fire(msg.clone()).await;
        if !msg.is_whisper() {
            self.inner.hooks.chat_msg.fire(msg.clone()).await;
        }

        let event = self
            .inner
            .middleware
            .run(PipelineEvent::cancelable(EventData::Receive { message: msg }))
            .await;
        let canceled = event.is_canceled();
        let EventData::Receive { message } = event.data else {
            return;
        };
        if canceled {
            return;
        }

        match self.inner.registry.match_message(&message) {
            MatchOutcome::Matched(command) => self.dispatch(command, message).await,
            MatchOutcome::Unknown => self.handle_unknown(&message).await,
            MatchOutcome::NoPrefix => {}
        }
    }

    async fn dispatch(&self, command: Arc<Command>, msg: AnyMessage) {
        let verdict = self
            .inner
            .gate
            .admit(&command, &msg, &self.inner.middleware)
            .await;
        if !verdict.is_admitted() {
            self.handle_refusal(&command, &msg, verdict).await;
            return;
        }

        let event = self
            .inner
            .middleware
            .run(PipelineEvent::cancelable(EventData::Command {
                message: msg.clone(),
                command: command.name().to_string(),
            }))
            .await;
        if event.is_canceled() {
            debug!(command = command.name(), "Command canceled by middleware");
            return;
        }

        let meta = TaskMeta {
            message: msg.clone(),
            command: command.name().to_string(),
        };
        let handler = command.handler();
        self.inner.supervisor.submit(meta, handler.handle(msg));
    }

    async fn handle_refusal(&self, command: &Command, msg: &AnyMessage, verdict: GateVerdict) {
        debug!(
            command = command.name(),
            outcome = %verdict.outcome,
            user = msg.user(),
            "Command refused"
        );
        if let CommandOutcome::NoPermissions(missing) = &verdict.outcome {
            self.inner
                .hooks
                .permission_error
                .fire(PermissionErrorArgs {
                    message: msg.clone(),
                    command: Some(command.name().to_string()),
                    missing: missing.clone(),
                })
                .await;
            if !self.no_permissions_message_enabled(msg) {
                return;
            }
        }
        if let Some(reply) = verdict.reply
            && let Err(error) = self.send(msg.reply(reply)).await
        {
            warn!(%error, "Failed to send refusal reply");
        }
    }

    async fn handle_unknown(&self, msg: &AnyMessage) {
        let policy = self.inner.unknown_command_policy.read().clone();
        match policy {
            UnknownCommandPolicy::Ignore => {}
            UnknownCommandPolicy::Warn => {
                warn!(message = %msg, "Unknown command");
            }
            UnknownCommandPolicy::Reply(text) => {
                if let Err(error) = self.send(msg.reply(text)).await {
                    warn!(%error, "Failed to send unknown-command reply");
                }
            }
        }
    }

    fn no_permissions_message_enabled(&self, msg: &AnyMessage) -> bool {
        self.inner
            .no_permissions_message
            .read()
            .contains(&(msg.channel().to_string(), msg.platform()))
    }

    async fn route_reply(&self, meta: &TaskMeta, reply: CommandReply) {
        let replies = match reply {
            CommandReply::None => Vec::new(),
            CommandReply::Text(text) => vec![meta.message.reply(text)],
            CommandReply::Messages(messages) => messages,
            CommandReply::Tagged(outcome, text) => {
                let suppress = matches!(outcome, CommandOutcome::NoPermissions(_))
                    && !self.no_permissions_message_enabled(&meta.message);
                if suppress {
                    Vec::new()
                } else {
                    vec![meta.message.reply(text)]
                }
            }
        };
        for message in replies {
            if let Err(error) = self.send(message).await {
                warn!(command = %meta.command, %error, "Failed to deliver reply");
            }
        }
    }

    async fn route_error(&self, meta: &TaskMeta, error: BoxError) {
        let handler = self.inner.error_handler.read().clone();
        if let Some(handler) = handler {
            handler(error, meta.clone()).await;
        }
        if let Err(error) = self.send(meta.message.reply(HANDLER_ERROR_REPLY)).await {
            warn!(command = %meta.command, %error, "Failed to send failure reply");
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Persistence
    // ────────────────────────────────────────────────────────────────────

    async fn load_state(&self) -> CoreResult<()> {
        if let Some(value) = self.inner.storage.load(PREFIXES_KEY).await? {
            let stored: Vec<StoredPrefix> = serde_json::from_value(value)
                .map_err(storage_error)?;
            for entry in stored {
                self.inner.registry.set_channel_prefix(
                    entry.channel.name,
                    entry.channel.platform,
                    entry.prefix,
                );
            }
        }
        if let Some(value) = self.inner.storage.load(CHANNELS_KEY).await? {
            let stored: Vec<StoredChannel> = serde_json::from_value(value)
                .map_err(storage_error)?;
            *self.inner.channels.write() = stored
                .into_iter()
                .map(|c| (c.platform, c.name))
                .collect();
        }
        Ok(())
    }

    async fn save_state(&self) -> CoreResult<()> {
        let prefixes: Vec<StoredPrefix> = self
            .inner
            .registry
            .channel_prefixes()
            .into_iter()
            .map(|((name, platform), prefix)| StoredPrefix {
                channel: StoredChannel { name, platform },
                prefix,
            })
            .collect();
        let channels: Vec<StoredChannel> = self
            .channels()
            .into_iter()
            .map(|(platform, name)| StoredChannel { name, platform })
            .collect();

        self.inner
            .storage
            .save(
                PREFIXES_KEY,
                serde_json::to_value(prefixes).map_err(storage_error)?,
            )
            .await?;
        self.inner
            .storage
            .save(
                CHANNELS_KEY,
                serde_json::to_value(channels).map_err(storage_error)?,
            )
            .await
    }
}

#[derive(Serialize, Deserialize)]
struct StoredChannel {
    name: String,
    platform: Platform,
}

#[derive(Serialize, Deserialize)]
struct StoredPrefix {
    channel: StoredChannel,
    prefix: String,
}

// ============================================================================
// Internal loops and the supervisor router
// ============================================================================

async fn receive_loop(bot: Bot, client: Arc<dyn PlatformClient>, shutdown: CancellationToken) {
    let platform = client.platform();
    info!(%platform, "Receive loop started");
    loop {
        let batch = tokio::select! {
            () = shutdown.cancelled() => return,
            batch = client.receive() => batch,
        };
        match batch {
            Ok(messages) => {
                // Messages within one batch are dispatched in receive order;
                // only the handlers they launch run concurrently.
                for message in messages {
                    bot.handle_message(message).await;
                }
            }
            Err(CoreError::Reconnect { .. }) => {
                warn!(%platform, "Connection dead; reconnecting");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                if let Err(error) = client.reconnect().await {
                    warn!(%platform, %error, "Reconnect failed; retrying");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
            Err(error) => {
                warn!(%platform, %error, "Receive failed");
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn flush_loop(client: Arc<dyn PlatformClient>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(FLUSH_INTERVAL) => {}
        }
        if let Err(error) = client.flush_queues().await {
            warn!(platform = %client.platform(), %error, "Flush failed");
        }
    }
}

struct BotRouter {
    bot: Weak<BotInner>,
}

#[async_trait]
impl ReplyRouter for BotRouter {
    async fn deliver(&self, meta: &TaskMeta, reply: CommandReply) {
        if let Some(inner) = self.bot.upgrade() {
            Bot { inner }.route_reply(meta, reply).await;
        }
    }

    async fn handler_error(&self, meta: &TaskMeta, error: BoxError) {
        if let Some(inner) = self.bot.upgrade() {
            Bot { inner }.route_error(meta, error).await;
        }
    }
}
