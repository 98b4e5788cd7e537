//! Outbound event delivery to remote clients

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope type tag understood by the message bus
const SEND_EVENT_TO_CLIENT: &str = "send_event_to_client";

/// Event types delivered to remote viewer clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// The device-side session ended; the viewer must drop its connection
    #[serde(rename = "stopConnection")]
    StopConnection,

    /// A session description from the gateway is ready for the viewer
    #[serde(rename = "getSdp")]
    GetSdp,
}

/// One event addressed to a remote client
///
/// Serializes to the message-bus wire shape:
/// `{"type": "send_event_to_client", "data": {"clientId", "eventType",
/// "eventData"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Message-bus envelope tag
    #[serde(rename = "type")]
    pub kind: String,

    /// Addressed payload
    pub data: ClientEventData,
}

/// Payload of a [`ClientEvent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEventData {
    /// Remote client the event is addressed to
    pub client_id: String,

    /// Event discriminator
    pub event_type: EventType,

    /// Event-specific payload, if any
    pub event_data: Option<Value>,
}

impl ClientEvent {
    /// Build an event addressed to `client_id`
    pub fn new(client_id: &str, event_type: EventType, event_data: Option<Value>) -> Self {
        Self {
            kind: SEND_EVENT_TO_CLIENT.to_string(),
            data: ClientEventData {
                client_id: client_id.to_string(),
                event_type,
                event_data,
            },
        }
    }
}

/// Message-bus adapter delivering events to remote clients
///
/// Implementations are external collaborators; delivery failures are
/// reported, never panicked on, since the orchestrator treats them as
/// best-effort notifications.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event to the client named in its payload
    async fn send(&self, event: &ClientEvent) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = ClientEvent::new("client-1", EventType::StopConnection, None);
        let wire = serde_json::to_value(&event).unwrap();

        assert_eq!(
            wire,
            json!({
                "type": "send_event_to_client",
                "data": {
                    "clientId": "client-1",
                    "eventType": "stopConnection",
                    "eventData": null,
                }
            })
        );
    }

    #[test]
    fn test_event_with_payload() {
        let payload = json!({"jsep": {"type": "offer", "sdp": "v=0"}});
        let event = ClientEvent::new("client-2", EventType::GetSdp, Some(payload.clone()));
        let wire = serde_json::to_value(&event).unwrap();

        assert_eq!(wire["data"]["eventType"], "getSdp");
        assert_eq!(wire["data"]["eventData"], payload);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = ClientEvent::new("client-3", EventType::GetSdp, Some(json!(1)));
        let json = serde_json::to_string(&event).unwrap();
        let back: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data.client_id, "client-3");
        assert_eq!(back.data.event_type, EventType::GetSdp);
    }
}
