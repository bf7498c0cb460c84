//! Keepalive pub/sub client.
//!
//! One [`PubSubClient`] maintains a single persistent connection,
//! multiplexes topic subscriptions over it, and invokes per-topic callbacks
//! for every published message.
//!
//! # Liveness
//!
//! Each connection runs three concurrent loops: a **pinger** that enqueues a
//! PING every `ping_interval`, a **sender** that drains the outbound queue,
//! and the **reader**.  The reader uses a short read timeout so liveness is
//! rechecked even when the connection is idle: whenever
//! `last_pong + 2 × ping_interval` passes without a pong, the connection is
//! presumed half-open and torn down.  The client must detect a stalled
//! connection within roughly that window plus one read timeout; it never
//! waits for a transport-level error.
//!
//! Reconnecting cancels the pinger and sender (awaited, so no frame is left
//! half-written), discards the per-connection outbound queue, and opens a
//! fresh connection.  Topic subscriptions and callbacks survive reconnects;
//! they are re-announced to the new connection with a single LISTEN frame.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::{InboundFrame, OutboundFrame};
use crate::transport::{FrameSink, FrameStream, PubSubTransport};

/// A callback invoked with the topic name and the decoded message payload.
pub type TopicCallback = Arc<dyn Fn(String, serde_json::Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Timing and authentication knobs.
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// Read timeout; bounds how long a liveness recheck can be deferred.
    pub read_timeout: Duration,
    /// Pong deadline grace after connecting, before the first real pong.
    pub initial_pong_grace: Duration,
    /// Delay between failed connection attempts.
    pub reconnect_delay: Duration,
    /// Bearer token sent with every LISTEN.
    pub auth_token: Option<String>,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            read_timeout: Duration::from_secs(5),
            initial_pong_grace: Duration::from_secs(20),
            reconnect_delay: Duration::from_secs(1),
            auth_token: None,
        }
    }
}

struct Shared {
    transport: Arc<dyn PubSubTransport>,
    config: PubSubConfig,
    callbacks: RwLock<HashMap<String, Vec<TopicCallback>>>,
    topics: RwLock<BTreeSet<String>>,
    sender: RwLock<Option<mpsc::UnboundedSender<OutboundFrame>>>,
}

impl Shared {
    /// Enqueues a frame on the current connection.  Dropped when offline;
    /// subscriptions are re-announced from the topic set on reconnect anyway.
    fn enqueue(&self, frame: OutboundFrame) {
        if let Some(tx) = self.sender.read().as_ref()
            && tx.send(frame).is_err()
        {
            debug!("Outbound queue closed; frame dropped");
        }
    }
}

/// The reconnecting pub/sub client.
pub struct PubSubClient {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    runner: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PubSubClient {
    /// Creates a client over `transport`.
    pub fn new(transport: Arc<dyn PubSubTransport>, config: PubSubConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                callbacks: RwLock::new(HashMap::new()),
                topics: RwLock::new(BTreeSet::new()),
                sender: RwLock::new(None),
            }),
            shutdown: CancellationToken::new(),
            runner: parking_lot::Mutex::new(None),
        }
    }

    /// Subscribes to `topics`.
    ///
    /// Registered topics survive reconnects; they are announced now (when
    /// connected) and re-announced on every new connection.
    pub fn listen(&self, topics: impl IntoIterator<Item = impl Into<String>>) {
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        if topics.is_empty() {
            return;
        }
        {
            let mut known = self.shared.topics.write();
            let mut callbacks = self.shared.callbacks.write();
            for topic in &topics {
                known.insert(topic.clone());
                callbacks.entry(topic.clone()).or_default();
            }
        }
        info!(?topics, "Listening");
        self.shared.enqueue(OutboundFrame::listen(
            topics,
            self.shared.config.auth_token.clone(),
        ));
    }

    /// Drops subscriptions to `topics`, callbacks included.
    pub fn unlisten(&self, topics: impl IntoIterator<Item = impl Into<String>>) {
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        if topics.is_empty() {
            return;
        }
        {
            let mut known = self.shared.topics.write();
            let mut callbacks = self.shared.callbacks.write();
            for topic in &topics {
                known.remove(topic);
                callbacks.remove(topic);
            }
        }
        info!(?topics, "Unlistening");
        self.shared.enqueue(OutboundFrame::unlisten(topics));
    }

    /// Registers a callback for `topic`.
    ///
    /// Multiple callbacks may share a topic; each one sees every message.
    pub fn on_topic<F, Fut>(&self, topic: impl Into<String>, callback: F)
    where
        F: Fn(String, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: TopicCallback = Arc::new(move |topic, payload| Box::pin(callback(topic, payload)));
        self.shared
            .callbacks
            .write()
            .entry(topic.into())
            .or_default()
            .push(callback);
    }

    /// Topics currently subscribed.
    pub fn topics(&self) -> Vec<String> {
        self.shared.topics.read().iter().cloned().collect()
    }

    /// Starts the connection loop.
    pub fn start(&self) {
        let mut runner = self.runner.lock();
        if runner.is_some() {
            return;
        }
        *runner = Some(tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            self.shutdown.clone(),
        )));
    }

    /// Stops the client and waits for the connection loop to wind down.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.runner.lock().take();
        if let Some(handle) = handle
            && handle.await.is_err()
        {
            warn!("Connection loop panicked");
        }
    }
}

// ============================================================================
// Connection loop
// ============================================================================

async fn run_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let connected = tokio::select! {
            () = shutdown.cancelled() => return,
            connected = shared.transport.connect() => connected,
        };
        match connected {
            Ok((sink, stream)) => {
                info!("Connected");
                run_connection(&shared, &shutdown, sink, stream).await;
            }
            Err(error) => {
                warn!(%error, "Connect failed; retrying");
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(shared.config.reconnect_delay) => {}
                }
            }
        }
    }
}

/// Drives one connection until it dies or shutdown is requested.
async fn run_connection(
    shared: &Arc<Shared>,
    shutdown: &CancellationToken,
    mut sink: Box<dyn FrameSink>,
    mut stream: Box<dyn FrameStream>,
) {
    // Fresh outbound queue per connection; frames buffered for a dead
    // connection are never replayed on the new one.
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Re-announce every retained topic exactly once.
    let topics: Vec<String> = shared.topics.read().iter().cloned().collect();
    if !topics.is_empty() {
        let _ = tx.send(OutboundFrame::listen(
            topics,
            shared.config.auth_token.clone(),
        ));
    }
    *shared.sender.write() = Some(tx.clone());

    let conn_token = CancellationToken::new();

    let sender = tokio::spawn({
        let token = conn_token.clone();
        async move {
            loop {
                let frame = tokio::select! {
                    () = token.cancelled() => break,
                    frame = rx.recv() => frame,
                };
                let Some(frame) = frame else { break };
                if let Err(error) = sink.send(frame).await {
                    warn!(%error, "Send failed");
                    break;
                }
            }
            // Runs outside the select, so a frame mid-write completes first.
            if let Err(error) = sink.close().await {
                debug!(%error, "Close failed");
            }
        }
    });

    let pinger = tokio::spawn({
        let token = conn_token.clone();
        let tx = tx.clone();
        let interval = shared.config.ping_interval;
        async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(interval) => {}
                }
                if tx.send(OutboundFrame::Ping).is_err() {
                    return;
                }
            }
        }
    });

    let mut last_pong = Instant::now() + shared.config.initial_pong_grace;
    let pong_deadline = shared.config.ping_interval * 2;

    loop {
        let read = tokio::select! {
            () = shutdown.cancelled() => break,
            read = timeout(shared.config.read_timeout, stream.next()) => read,
        };
        match read {
            // Idle; recheck liveness.
            Err(_elapsed) => {
                if last_pong + pong_deadline < Instant::now() {
                    warn!("No pong within deadline; reconnecting");
                    break;
                }
            }
            Ok(Err(error)) => {
                warn!(%error, "Read failed; reconnecting");
                break;
            }
            Ok(Ok(raw)) => {
                if !handle_frame(shared, &raw, &mut last_pong, pong_deadline).await {
                    break;
                }
            }
        }
    }

    // Tear down: stop accepting outbound frames, then cancel and await both
    // loops before the next connection attempt.
    *shared.sender.write() = None;
    conn_token.cancel();
    let _ = sender.await;
    let _ = pinger.await;
}

/// Dispatches one inbound frame.  Returns `false` when the connection must
/// be torn down.
async fn handle_frame(
    shared: &Arc<Shared>,
    raw: &str,
    last_pong: &mut Instant,
    pong_deadline: Duration,
) -> bool {
    match serde_json::from_str::<InboundFrame>(raw) {
        Ok(InboundFrame::Message { data }) => {
            let callbacks = shared.callbacks.read().get(&data.topic).cloned();
            match callbacks {
                Some(callbacks) if !callbacks.is_empty() => match data.payload() {
                    Ok(payload) => {
                        for callback in &callbacks {
                            callback(data.topic.clone(), payload.clone()).await;
                        }
                    }
                    Err(error) => {
                        warn!(topic = %data.topic, %error, "Undecodable message payload");
                    }
                },
                _ => warn!(topic = %data.topic, "Message for topic without callbacks"),
            }
            true
        }
        Ok(InboundFrame::Response { error, .. }) => {
            // A failed LISTEN is logged but does not poison the connection.
            if let Some(error) = error.filter(|e| !e.is_empty()) {
                warn!(%error, "Subscription request failed");
            }
            true
        }
        Ok(InboundFrame::Pong) => {
            if *last_pong + pong_deadline < Instant::now() {
                // A pong past the deadline means the connection silently
                // stalled and only just recovered.  Treat it like a missed
                // pong and reconnect rather than trusting the stall was a
                // one-off; accepting it here would keep a flaky connection
                // limping along indefinitely.
                warn!("Late pong; reconnecting");
                false
            } else {
                *last_pong = Instant::now();
                true
            }
        }
        Ok(InboundFrame::Reconnect) => {
            info!("Server requested reconnect");
            false
        }
        Err(error) => {
            warn!(%error, raw, "Unhandled frame");
            true
        }
    }
}
