//! Runtime orchestration.
//!
//! [`Runtime`] assembles the whole deployment from configuration: logging,
//! the [`Bot`] with its clients and middleware, the optional pub/sub client
//! with the live-status bridge, and the plugin set.  `run` then drives the
//! lifecycle until Ctrl+C or SIGTERM.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use solder_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> solder_runtime::RuntimeResult<()> {
//!     let mut runtime = Runtime::builder()
//!         .permissions(permission_provider())
//!         .client(twitch_client())
//!         .plugin(points_plugin())
//!         .build()?;
//!
//!     runtime.bot().add_command(ping_command()).await;
//!     runtime.run().await
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use solder_core::{Bot, Middleware, PermissionProvider, PlatformClient, Storage};
use solder_pubsub::{PubSubClient, PubSubConfig, WebSocketTransport};
use tokio::signal;
use tracing::{info, warn};

use crate::config::{ConfigLoader, PubSubSection, SolderConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::live::LiveStatusBridge;
use crate::logging;
use crate::plugin::{PluginDescriptor, PluginManager};

fn pubsub_config(section: &PubSubSection) -> PubSubConfig {
    let ping_interval = Duration::from_secs(section.ping_interval_secs);
    PubSubConfig {
        ping_interval,
        // First pong gets one ping round plus slack before the liveness
        // rule can trip.
        initial_pong_grace: ping_interval + Duration::from_secs(5),
        reconnect_delay: Duration::from_secs(section.reconnect_delay_secs),
        auth_token: section.auth_token.clone(),
        ..PubSubConfig::default()
    }
}

/// The assembled deployment.
pub struct Runtime {
    config: SolderConfig,
    bot: Bot,
    pubsub: Option<Arc<PubSubClient>>,
    plugins: PluginManager,
}

impl Runtime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &SolderConfig {
        &self.config
    }

    /// The bot instance.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// The pub/sub client, when enabled in configuration.
    pub fn pubsub(&self) -> Option<&Arc<PubSubClient>> {
        self.pubsub.as_ref()
    }

    /// Loads plugins, connects everything, and joins configured channels.
    pub async fn start(&mut self) -> RuntimeResult<()> {
        self.plugins.register_all(&self.bot).await?;

        self.bot.start().await?;

        for entry in &self.config.bot.channels {
            if let Err(e) = self.bot.join(&entry.name, entry.platform).await {
                warn!(channel = %entry.name, platform = %entry.platform, error = %e,
                      "Could not join configured channel");
            }
        }

        if let Some(pubsub) = &self.pubsub {
            pubsub.start();
        }

        info!("Runtime started");
        Ok(())
    }

    /// Tears down plugins, the pub/sub client, and the bot, in that order.
    pub async fn stop(&mut self) -> RuntimeResult<()> {
        self.plugins.teardown_all(&self.bot).await;

        if let Some(pubsub) = &self.pubsub {
            pubsub.stop().await;
        }

        self.bot.stop().await?;
        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until a shutdown signal is received.
    pub async fn run(&mut self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Running; press Ctrl+C to stop");
        wait_for_shutdown().await;
        self.stop().await
    }

    /// Runs until `shutdown` resolves.  Useful under test and for embedders
    /// with their own signal handling.
    pub async fn run_until<F>(&mut self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Could not register SIGTERM handler");
                if signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                }
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    }
}

/// Builder for a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config_file: Option<PathBuf>,
    profile: Option<String>,
    config_override: Option<SolderConfig>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    storage: Option<Arc<dyn Storage>>,
    clients: Vec<Arc<dyn PlatformClient>>,
    middleware: Vec<Arc<dyn Middleware>>,
    plugins: PluginManager,
}

impl RuntimeBuilder {
    /// Creates a builder with no sources configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a specific file instead of searching.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Uses `config` verbatim, skipping file and environment loading.
    pub fn config(mut self, config: SolderConfig) -> Self {
        self.config_override = Some(config);
        self
    }

    /// Sets the permission provider.  Required.
    pub fn permissions(mut self, provider: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(provider);
        self
    }

    /// Sets the state storage backend.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Adds a platform client.
    pub fn client(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// Adds a middleware, installed before any plugin loads.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Adds a plugin.
    pub fn plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.plugins.add(descriptor);
        self
    }

    /// Loads configuration, initializes logging, and assembles the runtime.
    ///
    /// Plugins are not loaded here; [`Runtime::start`] loads them once the
    /// bot exists to install them into.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = match self.config_override {
            Some(config) => config,
            None => {
                let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
                if let Some(path) = self.config_file {
                    loader = loader.file(path);
                }
                if let Some(profile) = self.profile {
                    loader = loader.profile(profile);
                }
                loader.load()?
            }
        };

        logging::init_from_config(&config.logging);
        validate_config(&config)?;

        let permissions = self.permissions.ok_or_else(|| {
            RuntimeError::Config(crate::config::ConfigError::MissingField {
                field: "permissions provider".to_string(),
            })
        })?;

        let mut builder = Bot::builder()
            .permissions(permissions)
            .prefix(config.bot.prefix.clone())
            .unknown_command_policy(config.bot.unknown_command.to_policy())
            .task_grace(config.bot.task_grace());
        if let Some(storage) = self.storage {
            builder = builder.storage(storage);
        }
        let bot = builder.build()?;

        for client in self.clients {
            bot.add_client(client);
        }
        for middleware in self.middleware {
            bot.add_middleware(middleware);
        }

        let pubsub = config.pubsub.enabled.then(|| {
            let transport = Arc::new(WebSocketTransport::new(config.pubsub.url.clone()));
            let client = Arc::new(PubSubClient::new(transport, pubsub_config(&config.pubsub)));
            LiveStatusBridge::attach(&bot, Arc::clone(&client));
            client
        });

        Ok(Runtime {
            config,
            bot,
            pubsub,
            plugins: self.plugins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelEntry;
    use solder_core::{Platform, StaticPermissions};

    fn base_config() -> SolderConfig {
        SolderConfig::default()
    }

    fn builder_with(config: SolderConfig) -> RuntimeBuilder {
        Runtime::builder()
            .config(config)
            .permissions(Arc::new(StaticPermissions::new()))
    }

    #[tokio::test]
    async fn missing_permission_provider_fails_build() {
        let result = Runtime::builder().config(base_config()).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_config_fails_build() {
        let mut config = base_config();
        config.bot.prefix.clear();
        let result = builder_with(config).build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn configured_channels_join_at_start() {
        let mut config = base_config();
        config.bot.channels.push(ChannelEntry {
            name: "testchannel".to_string(),
            platform: Platform::Twitch,
        });

        let mut runtime = builder_with(config).build().unwrap();
        runtime.start().await.unwrap();
        assert!(
            runtime
                .bot()
                .channels()
                .contains(&(Platform::Twitch, "testchannel".to_string()))
        );
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn plugins_load_during_start() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static LOADED: AtomicUsize = AtomicUsize::new(0);

        let plugin = PluginDescriptor::new("counter", |_bot| {
            Box::pin(async {
                LOADED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let mut runtime = builder_with(base_config()).plugin(plugin).build().unwrap();
        runtime.run_until(std::future::ready(())).await.unwrap();
        assert_eq!(LOADED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pubsub_client_exists_only_when_enabled() {
        let runtime = builder_with(base_config()).build().unwrap();
        assert!(runtime.pubsub().is_none());
        runtime.bot().stop().await.unwrap();

        let mut config = base_config();
        config.pubsub.enabled = true;
        let runtime = builder_with(config).build().unwrap();
        assert!(runtime.pubsub().is_some());
        runtime.bot().stop().await.unwrap();
    }
}
