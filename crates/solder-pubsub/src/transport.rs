//! Transport abstraction.
//!
//! The client's state machine only needs two halves per connection: a
//! [`FrameSink`] it writes control frames to and a [`FrameStream`] it reads
//! raw text frames from.  The production implementation is the websocket
//! transport in [`ws`](crate::ws); tests substitute an in-memory one.

use async_trait::async_trait;

use crate::error::PubSubResult;
use crate::frame::OutboundFrame;

/// The write half of one connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Serializes and writes one frame.
    async fn send(&mut self, frame: OutboundFrame) -> PubSubResult<()>;

    /// Flushes and closes the write half cleanly.
    async fn close(&mut self) -> PubSubResult<()>;
}

/// The read half of one connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Waits for the next text frame.
    ///
    /// Returns [`PubSubError::Closed`](crate::error::PubSubError::Closed)
    /// when the peer hangs up.
    async fn next(&mut self) -> PubSubResult<String>;
}

/// Opens connections for the pub/sub client.
///
/// Called once per connection attempt; every call must produce a fresh pair
/// of halves.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Opens a new connection.
    async fn connect(&self) -> PubSubResult<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}
