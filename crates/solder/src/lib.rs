//! # Solder
//!
//! A multi-platform chat bot core: gated command dispatch, a cancelable
//! middleware pipeline, a task supervisor for command handlers, and a
//! keepalive pub/sub client, orchestrated by a configurable runtime.
//!
//! ## Architecture
//!
//! Incoming messages flow through a fixed pipeline:
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌─────────────────────────┐   ┌────────────┐
//! │ Platform │──▶│ Matcher │──▶│ Gate                    │──▶│ Supervisor │
//! │ client   │   │ (prefix,│   │ whispers → allow-list → │   │ (spawned   │
//! └──────────┘   │  alias) │   │ cooldown → permissions  │   │  handlers) │
//!                └─────────┘   └─────────────────────────┘   └────────────┘
//!                     middleware observes and may cancel each stage
//! ```
//!
//! - **solder-core**: messages, commands, the gate, middleware, supervisor
//! - **solder-pubsub**: reconnecting topic subscription client
//! - **solder-runtime**: configuration, logging, plugins, orchestration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solder::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> solder::runtime::RuntimeResult<()> {
//!     let mut runtime = Runtime::builder()
//!         .permissions(permission_provider())
//!         .client(twitch_client())
//!         .build()?;
//!
//!     runtime
//!         .bot()
//!         .add_command(
//!             Command::builder("ping", |msg: AnyMessage| async move {
//!                 Ok(CommandReply::Text("Pong!".to_string()))
//!             })
//!             .build(),
//!         )
//!         .await;
//!
//!     runtime.run().await
//! }
//! ```

pub use solder_core as core;
pub use solder_pubsub as pubsub;
pub use solder_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use solder::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use solder_runtime::{PluginDescriptor, PluginManager, Runtime};

    // Dispatch surface
    pub use solder_core::prelude::*;

    // Pub/sub client
    pub use solder_pubsub::{PubSubClient, PubSubConfig, WebSocketTransport};

    // Logging macros
    pub use solder_runtime::tracing::{debug, error, info, trace, warn};
}
