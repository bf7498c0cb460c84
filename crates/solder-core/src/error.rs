//! Unified error types for the Solder core.
//!
//! Gate failures (cooldowns, missing permissions, allow-list misses) are
//! deliberately *not* errors; they are ordinary [`GateVerdict`] values.  The
//! types here cover the conditions that propagate through `Result`.
//!
//! [`GateVerdict`]: crate::gate::GateVerdict

use thiserror::Error;

use crate::message::Platform;

/// Boxed error type used at the command-handler boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The connection for a platform is dead and must be reopened.
    ///
    /// Raised by a [`PlatformClient`](crate::client::PlatformClient) to signal
    /// "reconnect me"; always recovered by the bot's reconnect handling and
    /// never surfaced to chat users.
    #[error("connection to {platform} is dead and must be reopened")]
    Reconnect {
        /// The platform whose connection died.
        platform: Platform,
    },

    /// No client is registered for the requested platform.
    #[error("no client registered for platform {platform}")]
    NoClient {
        /// The platform without a client.
        platform: Platform,
    },

    /// Sending failed even after a reconnect attempt.
    #[error("failed to send message on {platform} even after reconnecting")]
    ResendFailed {
        /// The platform the send was attempted on.
        platform: Platform,
    },

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Storage load/save failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The bot was misconfigured at construction time.
    #[error("setup error: {0}")]
    Setup(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
