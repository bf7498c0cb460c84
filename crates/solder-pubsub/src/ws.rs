//! WebSocket transport.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{info, trace};

use crate::error::{PubSubError, PubSubResult};
use crate::frame::OutboundFrame;
use crate::transport::{FrameSink, FrameStream, PubSubTransport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connects to a websocket pub/sub endpoint.
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Creates a transport for `url` (e.g. `wss://pubsub-edge.twitch.tv`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PubSubTransport for WebSocketTransport {
    async fn connect(&self) -> PubSubResult<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        info!(url = %self.url, "Connecting");
        let (stream, _response) = connect_async(&self.url)
            .await
            .map_err(|e| PubSubError::Connect(e.to_string()))?;
        let (sink, source) = stream.split();
        Ok((
            Box::new(WsFrameSink { sink }),
            Box::new(WsFrameStream { source }),
        ))
    }
}

struct WsFrameSink {
    sink: WsSink,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: OutboundFrame) -> PubSubResult<()> {
        let text =
            serde_json::to_string(&frame).map_err(|e| PubSubError::Transport(e.to_string()))?;
        trace!(frame = %text, "Sending");
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| PubSubError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> PubSubResult<()> {
        self.sink
            .close()
            .await
            .map_err(|e| PubSubError::Transport(e.to_string()))
    }
}

struct WsFrameStream {
    source: WsSource,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next(&mut self) -> PubSubResult<String> {
        loop {
            match self.source.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                // Transport-level keepalive frames are not protocol frames.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => continue,
                Some(Ok(Message::Close(_) | Message::Frame(_))) | None => {
                    return Err(PubSubError::Closed);
                }
                Some(Err(e)) => return Err(PubSubError::Transport(e.to_string())),
            }
        }
    }
}
