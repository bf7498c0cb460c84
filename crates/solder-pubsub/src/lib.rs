//! # Solder PubSub
//!
//! Keepalive pub/sub client for the Solder chat bot.
//!
//! Maintains one persistent connection to a push-notification endpoint,
//! multiplexes topic subscriptions over it, pings on an interval, and
//! reconnects whenever a pong is missed (or arrives too late), the read side
//! stalls, or the server asks for a reconnect.  Subscriptions and callbacks
//! survive reconnects.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use solder_pubsub::{PubSubClient, PubSubConfig, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(WebSocketTransport::new("wss://pubsub-edge.twitch.tv"));
//!     let client = PubSubClient::new(transport, PubSubConfig::default());
//!
//!     client.on_topic("video-playback.forsen", |topic, payload| async move {
//!         println!("{topic}: {payload}");
//!     });
//!     client.listen(["video-playback.forsen"]);
//!     client.start();
//! }
//! ```

pub mod client;
pub mod error;
pub mod frame;
pub mod transport;
pub mod ws;

pub use client::{PubSubClient, PubSubConfig, TopicCallback};
pub use error::{PubSubError, PubSubResult};
pub use frame::{InboundFrame, ListenData, MessageData, OutboundFrame, UnlistenData};
pub use transport::{FrameSink, FrameStream, PubSubTransport};
pub use ws::WebSocketTransport;
