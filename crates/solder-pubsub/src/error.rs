//! Pub/sub error types.
//!
//! Dead connections are not surfaced as errors to the embedder; the client's
//! run loop recovers them by reconnecting.  These types cover transport
//! failures inside one connection attempt.

use thiserror::Error;

/// Errors from the pub/sub transport layer.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// Opening the transport failed.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// A read or write on an open connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

/// Result type for pub/sub operations.
pub type PubSubResult<T> = Result<T, PubSubError>;
