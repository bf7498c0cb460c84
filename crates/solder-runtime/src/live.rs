//! Live-status bridge between the bot and the pub/sub client.
//!
//! Joining a channel subscribes to its `video-playback.<channel>` topic;
//! parting drops the subscription.  Stream-up and stream-down notifications
//! arriving on the topic are fed back into the bot's pipeline as
//! [`EventKind::StreamState`](solder_core::EventKind::StreamState) events, so
//! any middleware (or plugin-installed middleware) can react to a channel
//! going live without talking to the pub/sub client itself.

use std::sync::Arc;

use async_trait::async_trait;
use solder_core::{Bot, EventData, Middleware, PipelineEvent, Platform};
use solder_pubsub::PubSubClient;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Returns the playback topic for `channel`.
pub fn video_playback_topic(channel: &str) -> String {
    format!("video-playback.{channel}")
}

fn live_flag(payload: &serde_json::Value) -> Option<bool> {
    match payload.get("type").and_then(|t| t.as_str())? {
        "stream-up" => Some(true),
        "stream-down" => Some(false),
        // Viewcount and commercial notifications arrive on the same topic.
        _ => None,
    }
}

/// Middleware that mirrors channel membership into topic subscriptions.
pub struct LiveStatusBridge {
    pubsub: Arc<PubSubClient>,
    events: mpsc::UnboundedSender<(String, bool)>,
}

impl LiveStatusBridge {
    /// Builds the bridge, installs it as a middleware on `bot`, and spawns
    /// the forwarder task that turns topic notifications into `StreamState`
    /// pipeline events.  The task exits with the bot's shutdown token.
    pub fn attach(bot: &Bot, pubsub: Arc<PubSubClient>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, bool)>();

        let forwarder_bot = bot.clone();
        let shutdown = bot.shutdown_token();
        tokio::spawn(async move {
            loop {
                let (channel, live) = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    next = rx.recv() => match next {
                        Some(pair) => pair,
                        None => return,
                    },
                };
                debug!(channel = %channel, live, "Stream state changed");
                forwarder_bot
                    .middleware()
                    .run(PipelineEvent::notify(EventData::StreamState {
                        channel,
                        live,
                    }))
                    .await;
            }
        });

        bot.add_middleware(Arc::new(Self { pubsub, events: tx }));
    }

    fn subscribe(&self, channel: &str) {
        let topic = video_playback_topic(channel);
        let events = self.events.clone();
        let channel = channel.to_string();
        self.pubsub.on_topic(&topic, move |topic, payload| {
            let events = events.clone();
            let channel = channel.clone();
            async move {
                match live_flag(&payload) {
                    Some(live) => {
                        let _ = events.send((channel, live));
                    }
                    None => trace!(topic = %topic, "Ignoring playback notification"),
                }
            }
        });
        self.pubsub.listen([topic]);
    }
}

#[async_trait]
impl Middleware for LiveStatusBridge {
    fn name(&self) -> &str {
        "live-status"
    }

    async fn on_join(&self, event: &mut PipelineEvent) {
        if event.is_canceled() {
            return;
        }
        if let EventData::Join {
            channel,
            platform: Platform::Twitch,
        } = &event.data
        {
            self.subscribe(channel);
        }
    }

    async fn on_part(&self, event: &mut PipelineEvent) {
        if event.is_canceled() {
            return;
        }
        if let EventData::Part {
            channel,
            platform: Platform::Twitch,
        } = &event.data
        {
            self.pubsub.unlisten([video_playback_topic(channel)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use solder_core::StaticPermissions;
    use solder_pubsub::{FrameSink, FrameStream, OutboundFrame, PubSubConfig, PubSubTransport};
    use solder_pubsub::{PubSubError, PubSubResult};

    struct NullSink;

    #[async_trait]
    impl FrameSink for NullSink {
        async fn send(&mut self, _frame: OutboundFrame) -> PubSubResult<()> {
            Ok(())
        }

        async fn close(&mut self) -> PubSubResult<()> {
            Ok(())
        }
    }

    struct SilentStream;

    #[async_trait]
    impl FrameStream for SilentStream {
        async fn next(&mut self) -> PubSubResult<String> {
            std::future::pending::<()>().await;
            Err(PubSubError::Closed)
        }
    }

    struct NullTransport;

    #[async_trait]
    impl PubSubTransport for NullTransport {
        async fn connect(&self) -> PubSubResult<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
            Ok((Box::new(NullSink), Box::new(SilentStream)))
        }
    }

    fn test_bot() -> Bot {
        Bot::builder()
            .permissions(Arc::new(StaticPermissions::new()))
            .build()
            .unwrap()
    }

    fn test_pubsub() -> Arc<PubSubClient> {
        Arc::new(PubSubClient::new(
            Arc::new(NullTransport),
            PubSubConfig::default(),
        ))
    }

    struct StateRecorder {
        seen: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl Middleware for StateRecorder {
        fn name(&self) -> &str {
            "state-recorder"
        }

        async fn on_stream_state(&self, event: &mut PipelineEvent) {
            if let EventData::StreamState { channel, live } = &event.data {
                self.seen.lock().push((channel.clone(), *live));
            }
        }
    }

    #[tokio::test]
    async fn join_and_part_mirror_topic_subscriptions() {
        let bot = test_bot();
        let pubsub = test_pubsub();
        LiveStatusBridge::attach(&bot, Arc::clone(&pubsub));

        bot.join("forsen", Platform::Twitch).await.unwrap();
        assert_eq!(pubsub.topics(), ["video-playback.forsen"]);

        bot.part("forsen", Platform::Twitch).await.unwrap();
        assert!(pubsub.topics().is_empty());
        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn canceled_join_does_not_subscribe() {
        struct JoinVeto;

        #[async_trait]
        impl Middleware for JoinVeto {
            fn name(&self) -> &str {
                "join-veto"
            }

            async fn on_join(&self, event: &mut PipelineEvent) {
                event.cancel();
            }
        }

        let bot = test_bot();
        let pubsub = test_pubsub();
        bot.add_middleware(Arc::new(JoinVeto));
        LiveStatusBridge::attach(&bot, Arc::clone(&pubsub));

        let _ = bot.join("forsen", Platform::Twitch).await;
        assert!(pubsub.topics().is_empty());
        bot.stop().await.unwrap();
    }

    struct OneMessageStream {
        frame: Option<String>,
    }

    #[async_trait]
    impl FrameStream for OneMessageStream {
        async fn next(&mut self) -> PubSubResult<String> {
            match self.frame.take() {
                Some(frame) => Ok(frame),
                None => {
                    std::future::pending::<()>().await;
                    Err(PubSubError::Closed)
                }
            }
        }
    }

    struct OneMessageTransport {
        frame: String,
    }

    #[async_trait]
    impl PubSubTransport for OneMessageTransport {
        async fn connect(&self) -> PubSubResult<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
            Ok((
                Box::new(NullSink),
                Box::new(OneMessageStream {
                    frame: Some(self.frame.clone()),
                }),
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stream_up_becomes_a_stream_state_event() {
        let frame = r#"{"type":"MESSAGE","data":{"topic":"video-playback.forsen","message":"{\"type\":\"stream-up\",\"play_delay\":0}"}}"#;
        let bot = test_bot();
        let pubsub = Arc::new(PubSubClient::new(
            Arc::new(OneMessageTransport {
                frame: frame.to_string(),
            }),
            PubSubConfig::default(),
        ));
        LiveStatusBridge::attach(&bot, Arc::clone(&pubsub));

        let recorder = Arc::new(StateRecorder {
            seen: Mutex::new(Vec::new()),
        });
        bot.add_middleware(Arc::clone(&recorder) as Arc<dyn Middleware>);

        bot.join("forsen", Platform::Twitch).await.unwrap();
        pubsub.start();

        for _ in 0..100 {
            if !recorder.seen.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(
            recorder.seen.lock().as_slice(),
            [("forsen".to_string(), true)]
        );

        pubsub.stop().await;
        bot.stop().await.unwrap();
    }

    #[test]
    fn only_state_transitions_are_forwarded() {
        assert_eq!(
            live_flag(&serde_json::json!({"type": "stream-up", "play_delay": 0})),
            Some(true)
        );
        assert_eq!(
            live_flag(&serde_json::json!({"type": "stream-down"})),
            Some(false)
        );
        assert_eq!(
            live_flag(&serde_json::json!({"type": "viewcount", "viewers": 3})),
            None
        );
        assert_eq!(live_flag(&serde_json::json!({"viewers": 3})), None);
    }
}
