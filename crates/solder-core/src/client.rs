//! Platform client trait.
//!
//! One [`PlatformClient`] exists per chat network.  It normalizes native
//! protocol frames into [`AnyMessage`] values on receive and transports
//! outgoing ones.  The bot core treats clients purely through this trait;
//! concrete implementations (Twitch IRC, Discord, plain IRC) live outside the
//! core crate.
//!
//! # Reconnect contract
//!
//! A client that detects a dead connection returns
//! [`CoreError::Reconnect`] from [`send`](PlatformClient::send) or
//! [`receive`](PlatformClient::receive).  The caller — the bot's receive loop
//! or send path — reacts by calling [`reconnect`](PlatformClient::reconnect)
//! and retrying.  Clients never reconnect themselves mid-call.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::message::{AnyMessage, Platform};

/// A connection to one chat network.
///
/// Implementations use interior mutability; all methods take `&self` so a
/// client can be shared behind an `Arc` between the receive loop, the send
/// path, and the flush loop.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// The platform this client talks to.
    fn platform(&self) -> Platform;

    /// Opens the connection and authenticates.
    async fn connect(&self) -> CoreResult<()>;

    /// Closes the connection.
    async fn disconnect(&self) -> CoreResult<()>;

    /// Sends one outgoing message.
    async fn send(&self, msg: AnyMessage) -> CoreResult<()>;

    /// Waits for and returns the next batch of inbound messages.
    ///
    /// May return an empty batch (e.g. after a protocol-level frame that does
    /// not map to a chat line).
    async fn receive(&self) -> CoreResult<Vec<AnyMessage>>;

    /// Joins a channel.
    async fn join(&self, channel: &str) -> CoreResult<()>;

    /// Leaves a channel.
    async fn part(&self, channel: &str) -> CoreResult<()>;

    /// Flushes any internally queued outgoing traffic.
    async fn flush_queues(&self) -> CoreResult<()>;

    /// Tears the connection down and reopens it.
    async fn reconnect(&self) -> CoreResult<()> {
        self.disconnect().await?;
        self.connect().await
    }
}
