//! Signaling channel interface and wire types
//!
//! One [`SignalingChannel`] represents a negotiated connection to the
//! gateway for a single viewing session. Inbound gateway traffic is
//! delivered through an explicit mpsc channel handed to the
//! [`SignalingConnector`], so sessions stay decoupled from the transport's
//! own dispatch machinery.

mod keepalive;
pub mod websocket;

pub use keepalive::KeepaliveWorker;
pub use websocket::{WebSocketChannel, WebSocketConnector};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Control messages sent to the gateway's streaming capability
///
/// Serialize to `{"request": "list"|"watch"|"start"|"destroy", "id"?: n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum ControlRequest {
    /// List the streams the capability can serve
    List,
    /// Select the stream with the given numeric identifier
    Watch {
        /// Stream identifier (see `VideoEncoding::stream_id`)
        id: u32,
    },
    /// Begin relaying media for the selected stream
    Start,
    /// Tear down the capability's media state
    Destroy,
}

/// A remote session description received from the viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDescription {
    /// Description type (`"offer"` or `"answer"`)
    #[serde(rename = "type")]
    pub kind: String,

    /// SDP payload
    pub sdp: String,
}

/// A connectivity candidate relayed from the viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u32>,
}

/// One message received from the gateway on a session's channel
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Gateway session the message belongs to, when present
    pub session_id: Option<u64>,

    /// Classified payload
    pub kind: InboundKind,
}

/// Inbound payloads the orchestrator reacts to
#[derive(Debug, Clone)]
pub enum InboundKind {
    /// The streaming capability finished attaching
    StreamingAttached,

    /// The gateway hung up the media session
    Hangup,

    /// The gateway produced a session description for the viewer; carries
    /// the full original message, relayed to the client verbatim
    RemoteDescription(Value),

    /// Anything the orchestrator does not act on
    Other,
}

impl InboundMessage {
    /// Classify a raw gateway message
    pub fn classify(raw: &Value) -> Self {
        let session_id = raw.get("session_id").and_then(Value::as_u64);

        let kind = if raw.get("janus").and_then(Value::as_str) == Some("hangup") {
            InboundKind::Hangup
        } else if raw.get("jsep").is_some() {
            InboundKind::RemoteDescription(raw.clone())
        } else {
            InboundKind::Other
        };

        Self { session_id, kind }
    }
}

/// One negotiated connection to the signaling gateway
///
/// All methods take `&self`; implementations synchronize internally so a
/// session and its keepalive worker can share the channel.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Establish the gateway session
    async fn connect(&self) -> Result<()>;

    /// Request attachment of the streaming capability
    ///
    /// The confirmation arrives asynchronously as
    /// [`InboundKind::StreamingAttached`] on the inbound channel.
    async fn register_streaming(&self) -> Result<()>;

    /// Send a control message to the streaming capability
    async fn send_control(&self, request: ControlRequest) -> Result<()>;

    /// Apply the viewer's remote session description
    async fn set_remote_description(&self, desc: &RemoteDescription) -> Result<()>;

    /// Forward a connectivity candidate from the viewer
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Send one heartbeat
    async fn keepalive(&self) -> Result<()>;

    /// Tear down the gateway session and the underlying transport
    async fn disconnect(&self) -> Result<()>;

    /// Gateway session id, known once connected
    fn session_id(&self) -> Option<u64>;
}

/// Factory opening one channel per viewing session
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Open a channel; all inbound gateway traffic is pushed into `inbound`
    async fn open(
        &self,
        inbound: mpsc::UnboundedSender<InboundMessage>,
    ) -> Result<Arc<dyn SignalingChannel>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_request_wire_shapes() {
        assert_eq!(
            serde_json::to_value(ControlRequest::List).unwrap(),
            json!({"request": "list"})
        );
        assert_eq!(
            serde_json::to_value(ControlRequest::Watch { id: 1 }).unwrap(),
            json!({"request": "watch", "id": 1})
        );
        assert_eq!(
            serde_json::to_value(ControlRequest::Start).unwrap(),
            json!({"request": "start"})
        );
        assert_eq!(
            serde_json::to_value(ControlRequest::Destroy).unwrap(),
            json!({"request": "destroy"})
        );
    }

    #[test]
    fn test_ice_candidate_wire_shape() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 UDP 2122252543 192.168.1.5 44444 typ host".to_string(),
            sdp_mid: Some("video".to_string()),
            sdp_mline_index: Some(0),
        };
        let wire = serde_json::to_value(&candidate).unwrap();
        assert_eq!(wire["sdpMid"], "video");
        assert_eq!(wire["sdpMLineIndex"], 0);
    }

    #[test]
    fn test_classify_hangup() {
        let raw = json!({"janus": "hangup", "session_id": 42, "reason": "ICE failed"});
        let message = InboundMessage::classify(&raw);
        assert_eq!(message.session_id, Some(42));
        assert!(matches!(message.kind, InboundKind::Hangup));
    }

    #[test]
    fn test_classify_session_description() {
        let raw = json!({
            "janus": "event",
            "session_id": 42,
            "jsep": {"type": "offer", "sdp": "v=0"},
        });
        let message = InboundMessage::classify(&raw);
        assert_eq!(message.session_id, Some(42));
        match message.kind {
            InboundKind::RemoteDescription(payload) => {
                assert_eq!(payload["jsep"]["type"], "offer");
            }
            other => panic!("expected RemoteDescription, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_unhandled() {
        let raw = json!({"janus": "webrtcup", "session_id": 7});
        let message = InboundMessage::classify(&raw);
        assert!(matches!(message.kind, InboundKind::Other));
    }

    #[test]
    fn test_remote_description_field_names() {
        let desc: RemoteDescription =
            serde_json::from_value(json!({"type": "answer", "sdp": "v=0"})).unwrap();
        assert_eq!(desc.kind, "answer");
        assert_eq!(desc.sdp, "v=0");
    }
}
