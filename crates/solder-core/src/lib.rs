//! # Solder Core
//!
//! The dispatch engine of the Solder chat bot.
//!
//! This crate turns inbound chat lines from any number of platforms into
//! gated command invocations and routes the replies back out.
//!
//! ## Pipeline
//!
//! Every message travels the same path:
//!
//! ```text
//! ┌──────────────┐    ┌───────────┐    ┌──────┐    ┌────────────┐
//! │ PlatformClient│──▶│ Middleware │──▶│ Match │──▶│    Gate     │
//! │   (receive)  │    │ "receive"  │   │       │   │ cooldowns + │
//! └──────────────┘    └───────────┘    └──────┘    │ permissions │
//!                                                   └──────┬──────┘
//!        ┌──────────────┐    ┌───────────┐    ┌────────────▼──────┐
//!        │ PlatformClient│◀──│ Middleware │◀──│  Task Supervisor   │
//!        │    (send)    │    │  "send"    │   │ (concurrent tasks) │
//!        └──────────────┘    └───────────┘    └───────────────────┘
//! ```
//!
//! - [`message`]: platform-neutral message types
//! - [`client`]: the [`PlatformClient`] boundary one chat network implements
//! - [`command`] / [`registry`]: command descriptions, prefix rules, matching
//! - [`cooldown`] / [`permissions`] / [`gate`]: rate limiting and capability
//!   checks, with tagged refusal outcomes instead of errors
//! - [`middleware`]: the ordered, cancelable lifecycle event pipeline
//! - [`supervisor`]: concurrent handler execution with failure isolation
//! - [`bot`]: the context object tying it all together
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use solder_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> solder_core::CoreResult<()> {
//!     let bot = Bot::builder()
//!         .permissions(Arc::new(StaticPermissions::new()))
//!         .build()?;
//!
//!     bot.add_command(
//!         Command::builder("ping", |_msg: AnyMessage| async {
//!             Ok(CommandReply::Text("pong!".to_string()))
//!         })
//!         .build(),
//!     )
//!     .await;
//!
//!     bot.start().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod client;
pub mod command;
pub mod cooldown;
pub mod error;
pub mod gate;
pub mod message;
pub mod middleware;
pub mod permissions;
pub mod registry;
pub mod storage;
pub mod supervisor;

pub use bot::{Bot, BotBuilder, CommandErrorHandler, HookList, Hooks, PermissionErrorArgs};
pub use client::PlatformClient;
pub use command::{
    Command, CommandBuilder, CommandHandler, CommandOutcome, CommandReply, MatchContext,
};
pub use cooldown::{CommandCooldown, CooldownLedger, CooldownScope};
pub use error::{BoxError, CoreError, CoreResult};
pub use gate::{Gate, GateVerdict};
pub use message::{AnyMessage, Platform, StandardizedMessage, StandardizedWhisperMessage};
pub use middleware::{EventData, EventKind, Middleware, MiddlewareStack, PipelineEvent};
pub use permissions::{PermissionProvider, StaticPermissions};
pub use registry::{CommandRegistry, MatchOutcome, UnknownCommandPolicy};
pub use storage::{MemoryStorage, Storage};
pub use supervisor::{ReplyRouter, Supervisor, TaskMeta};

/// Prelude for common imports.
pub mod prelude {
    pub use super::bot::{Bot, Hooks};
    pub use super::client::PlatformClient;
    pub use super::command::{Command, CommandOutcome, CommandReply};
    pub use super::cooldown::CommandCooldown;
    pub use super::error::{BoxError, CoreError, CoreResult};
    pub use super::message::{
        AnyMessage, Platform, StandardizedMessage, StandardizedWhisperMessage,
    };
    pub use super::middleware::{EventData, Middleware, MiddlewareStack, PipelineEvent};
    pub use super::permissions::{PermissionProvider, StaticPermissions};
    pub use super::registry::UnknownCommandPolicy;
    pub use super::storage::Storage;
}
