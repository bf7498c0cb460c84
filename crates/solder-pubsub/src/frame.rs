//! Wire frames.
//!
//! JSON frames tagged by a `type` field.  Outbound control frames announce
//! and drop topic subscriptions and carry keepalive pings; inbound frames
//! deliver topic messages, command responses, pongs and the server's
//! reconnect request.

use serde::{Deserialize, Serialize};

/// Payload of an outbound `LISTEN` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenData {
    /// Topics to subscribe to.
    pub topics: Vec<String>,
    /// Bearer token, when the endpoint requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Payload of an outbound `UNLISTEN` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlistenData {
    /// Topics to drop.
    pub topics: Vec<String>,
}

/// A frame the client writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OutboundFrame {
    /// Subscribe to topics.
    Listen {
        /// Correlation id; the endpoint echoes it in its `RESPONSE`.
        nonce: String,
        /// Subscription payload.
        data: ListenData,
    },
    /// Drop topic subscriptions.
    Unlisten {
        /// Correlation id.
        nonce: String,
        /// The topics to drop.
        data: UnlistenData,
    },
    /// Keepalive probe.
    Ping,
}

impl OutboundFrame {
    /// Builds a `LISTEN` frame for `topics`.
    pub fn listen(topics: Vec<String>, auth_token: Option<String>) -> Self {
        OutboundFrame::Listen {
            nonce: String::new(),
            data: ListenData { topics, auth_token },
        }
    }

    /// Builds an `UNLISTEN` frame for `topics`.
    pub fn unlisten(topics: Vec<String>) -> Self {
        OutboundFrame::Unlisten {
            nonce: String::new(),
            data: UnlistenData { topics },
        }
    }
}

/// Payload of an inbound `MESSAGE` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    /// The topic the message was published to.
    pub topic: String,
    /// The published payload, itself a JSON-encoded string.
    pub message: String,
}

impl MessageData {
    /// Decodes the doubly-encoded payload.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.message)
    }
}

/// A frame the client reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum InboundFrame {
    /// A published topic message.
    Message {
        /// Topic and payload.
        data: MessageData,
    },
    /// Acknowledgement of a `LISTEN`/`UNLISTEN`.
    Response {
        /// Non-empty on failure.  The connection stays open either way.
        #[serde(default)]
        error: Option<String>,
        /// Echo of the request nonce.
        #[serde(default)]
        nonce: Option<String>,
    },
    /// Keepalive answer.
    Pong,
    /// The server asks the client to tear down and reconnect.
    Reconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_frame_wire_shape() {
        let frame = OutboundFrame::listen(
            vec!["video-playback.foo".to_string()],
            Some("secret".to_string()),
        );
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "LISTEN",
                "nonce": "",
                "data": {"topics": ["video-playback.foo"], "auth_token": "secret"}
            })
        );
    }

    #[test]
    fn ping_frame_is_bare() {
        let json = serde_json::to_string(&OutboundFrame::Ping).unwrap();
        assert_eq!(json, r#"{"type":"PING"}"#);
    }

    #[test]
    fn message_frame_parses_with_nested_payload() {
        let raw = r#"{"type":"MESSAGE","data":{"topic":"video-playback.foo","message":"{\"viewers\":12}"}}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        let InboundFrame::Message { data } = frame else {
            panic!("wrong variant");
        };
        assert_eq!(data.topic, "video-playback.foo");
        assert_eq!(data.payload().unwrap()["viewers"], 12);
    }

    #[test]
    fn response_error_field_is_optional() {
        let ok: InboundFrame = serde_json::from_str(r#"{"type":"RESPONSE"}"#).unwrap();
        assert_eq!(ok, InboundFrame::Response { error: None, nonce: None });

        let failed: InboundFrame =
            serde_json::from_str(r#"{"type":"RESPONSE","error":"ERR_BADAUTH","nonce":""}"#)
                .unwrap();
        let InboundFrame::Response { error, .. } = failed else {
            panic!("wrong variant");
        };
        assert_eq!(error.as_deref(), Some("ERR_BADAUTH"));
    }

    #[test]
    fn unknown_frame_type_is_a_parse_error() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"type":"MYSTERY"}"#).is_err());
    }
}
