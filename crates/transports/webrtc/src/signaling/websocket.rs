//! WebSocket signaling channel against the gateway's local endpoint
//!
//! Every request is a JSON object tagged with a `janus` verb and a unique
//! `transaction`; the gateway echoes the transaction in its reply.
//! Asynchronous events (hangups, session descriptions) carry no pending
//! transaction and are forwarded to the session's inbound channel.

use super::{
    ControlRequest, IceCandidate, InboundKind, InboundMessage, RemoteDescription,
    SignalingChannel, SignalingConnector,
};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use peercam_core::SignalingConfig;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Streaming capability identifier on the gateway
const STREAMING_PLUGIN: &str = "janus.plugin.streaming";

/// Subprotocol the gateway's WebSocket transport requires
const GATEWAY_SUBPROTOCOL: &str = "janus-protocol";

/// Connector opening one [`WebSocketChannel`] per viewing session
pub struct WebSocketConnector {
    config: SignalingConfig,
}

impl WebSocketConnector {
    /// Create a connector for the configured gateway endpoint
    pub fn new(config: SignalingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn open(
        &self,
        inbound: mpsc::UnboundedSender<InboundMessage>,
    ) -> Result<Arc<dyn SignalingChannel>> {
        let channel = WebSocketChannel::open(self.config.clone(), inbound).await?;
        Ok(Arc::new(channel))
    }
}

#[derive(Default)]
struct ChannelState {
    session_id: Mutex<Option<u64>>,
    handle_id: Mutex<Option<u64>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    attach_transaction: Mutex<Option<String>>,
    pending_jsep: Mutex<Option<Value>>,
}

/// Signaling channel over the gateway's WebSocket transport
pub struct WebSocketChannel {
    secret: String,
    handshake_timeout: Duration,
    outbox: mpsc::UnboundedSender<Message>,
    state: Arc<ChannelState>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketChannel {
    /// Establish the WebSocket transport and start the I/O tasks
    pub(crate) async fn open(
        config: SignalingConfig,
        inbound: mpsc::UnboundedSender<InboundMessage>,
    ) -> Result<Self> {
        debug!("Connecting to signaling gateway: {}", config.url);

        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::WebSocket(format!("invalid gateway url: {}", e)))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(GATEWAY_SUBPROTOCOL),
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::WebSocket(format!("failed to connect: {}", e)))?;

        let (write, read) = ws_stream.split();
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let state = Arc::new(ChannelState::default());

        tokio::spawn(Self::sender_task(write, outbox_rx));
        let receiver = tokio::spawn(Self::receiver_task(read, state.clone(), inbound));

        let handshake_timeout = config.attach_timeout();
        Ok(Self {
            secret: config.secret,
            handshake_timeout,
            outbox,
            state,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    /// Sender task: drains the outbox into the WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write.send(message).await {
                error!("Failed to send signaling message: {}", e);
                break;
            }
        }

        debug!("Signaling sender task terminated");
    }

    /// Receiver task: parses inbound frames and routes them
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        state: Arc<ChannelState>,
        inbound: mpsc::UnboundedSender<InboundMessage>,
    ) {
        while let Some(result) = read.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let raw: Value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!("Unparseable signaling message: {}", e);
                            continue;
                        }
                    };
                    Self::route_message(raw, &state, &inbound);
                }
                Ok(Message::Close(_)) => {
                    debug!("Signaling connection closed by gateway");
                    break;
                }
                Err(e) => {
                    error!("Signaling transport error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Signaling receiver task terminated");
    }

    /// Match transaction replies to their waiters; forward everything else
    fn route_message(
        raw: Value,
        state: &ChannelState,
        inbound: &mpsc::UnboundedSender<InboundMessage>,
    ) {
        let verb = raw.get("janus").and_then(Value::as_str);

        // "ack" only acknowledges receipt; the real reply follows
        if verb != Some("ack") {
            if let Some(transaction) = raw.get("transaction").and_then(Value::as_str) {
                let is_attach =
                    state.attach_transaction.lock().as_deref() == Some(transaction);
                if is_attach {
                    state.attach_transaction.lock().take();
                    if verb == Some("success") {
                        *state.handle_id.lock() = raw.pointer("/data/id").and_then(Value::as_u64);
                        let _ = inbound.send(InboundMessage {
                            session_id: raw.get("session_id").and_then(Value::as_u64),
                            kind: InboundKind::StreamingAttached,
                        });
                    } else {
                        warn!("Streaming capability attach failed: {}", raw);
                    }
                    return;
                }

                if let Some(reply) = state.pending.lock().remove(transaction) {
                    let _ = reply.send(raw);
                    return;
                }
            }
        }

        if inbound.send(InboundMessage::classify(&raw)).is_err() {
            debug!("Inbound receiver dropped; signaling event discarded");
        }
    }

    /// Queue a request tagged with `transaction` for sending
    fn send_with_transaction(&self, mut payload: Value, transaction: &str) -> Result<()> {
        payload["transaction"] = json!(transaction);
        if !self.secret.is_empty() {
            payload["apisecret"] = json!(self.secret);
        }
        self.outbox
            .send(Message::Text(payload.to_string()))
            .map_err(|e| Error::WebSocket(format!("signaling connection is closed: {}", e)))
    }

    /// Queue a fire-and-forget request
    fn send(&self, payload: Value) -> Result<()> {
        self.send_with_transaction(payload, &new_transaction())
    }

    /// Send a request and wait (bounded) for the gateway's reply
    async fn request(&self, payload: Value) -> Result<Value> {
        let transaction = new_transaction();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.state
            .pending
            .lock()
            .insert(transaction.clone(), reply_tx);

        if let Err(e) = self.send_with_transaction(payload, &transaction) {
            self.state.pending.lock().remove(&transaction);
            return Err(e);
        }

        match tokio::time::timeout(self.handshake_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::WebSocket(
                "signaling connection closed before reply".to_string(),
            )),
            Err(_) => {
                self.state.pending.lock().remove(&transaction);
                Err(Error::WebSocket(format!(
                    "no gateway reply within {:?}",
                    self.handshake_timeout
                )))
            }
        }
    }

    fn require_session(&self) -> Result<u64> {
        (*self.state.session_id.lock())
            .ok_or_else(|| Error::Signaling("channel is not connected".to_string()))
    }

    fn require_handle(&self) -> Result<(u64, u64)> {
        let session_id = self.require_session()?;
        let handle_id = (*self.state.handle_id.lock()).ok_or_else(|| {
            Error::Signaling("streaming capability is not attached".to_string())
        })?;
        Ok((session_id, handle_id))
    }
}

#[async_trait]
impl SignalingChannel for WebSocketChannel {
    async fn connect(&self) -> Result<()> {
        let reply = self.request(json!({"janus": "create"})).await?;
        if reply.get("janus").and_then(Value::as_str) != Some("success") {
            return Err(Error::Signaling(format!(
                "gateway rejected session create: {}",
                reply
            )));
        }

        let session_id = reply
            .pointer("/data/id")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Signaling("session create reply carried no id".to_string()))?;
        *self.state.session_id.lock() = Some(session_id);

        debug!("Gateway session {} established", session_id);
        Ok(())
    }

    async fn register_streaming(&self) -> Result<()> {
        let session_id = self.require_session()?;

        let transaction = new_transaction();
        *self.state.attach_transaction.lock() = Some(transaction.clone());

        self.send_with_transaction(
            json!({
                "janus": "attach",
                "session_id": session_id,
                "plugin": STREAMING_PLUGIN,
            }),
            &transaction,
        )
    }

    async fn send_control(&self, request: ControlRequest) -> Result<()> {
        let (session_id, handle_id) = self.require_handle()?;

        let mut payload = json!({
            "janus": "message",
            "session_id": session_id,
            "handle_id": handle_id,
            "body": serde_json::to_value(request)?,
        });

        // a stored remote description rides along with the next control
        // message; the gateway expects the viewer's answer next to `start`
        if let Some(jsep) = self.state.pending_jsep.lock().take() {
            payload["jsep"] = jsep;
        }

        self.send(payload)
    }

    async fn set_remote_description(&self, desc: &RemoteDescription) -> Result<()> {
        *self.state.pending_jsep.lock() = Some(serde_json::to_value(desc)?);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let (session_id, handle_id) = self.require_handle()?;

        self.send(json!({
            "janus": "trickle",
            "session_id": session_id,
            "handle_id": handle_id,
            "candidate": serde_json::to_value(candidate)?,
        }))
    }

    async fn keepalive(&self) -> Result<()> {
        let session_id = self.require_session()?;
        self.send(json!({"janus": "keepalive", "session_id": session_id}))
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(session_id) = self.session_id() {
            // best effort; the gateway reaps dead sessions on its own
            let _ = self.send(json!({"janus": "destroy", "session_id": session_id}));
        }

        let _ = self.outbox.send(Message::Close(None));
        if let Some(receiver) = self.receiver.lock().take() {
            receiver.abort();
        }

        *self.state.session_id.lock() = None;
        *self.state.handle_id.lock() = None;
        Ok(())
    }

    fn session_id(&self) -> Option<u64> {
        *self.state.session_id.lock()
    }
}

fn new_transaction() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal gateway stub: answers `create` and `attach`, ignores the rest
    async fn mock_gateway() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            while let Some(Ok(message)) = ws.next().await {
                let text = match message {
                    Message::Text(text) => text,
                    _ => continue,
                };
                let request: Value = serde_json::from_str(&text).unwrap();

                let reply = match request["janus"].as_str() {
                    Some("create") => json!({
                        "janus": "success",
                        "transaction": request["transaction"],
                        "data": {"id": 7001},
                    }),
                    Some("attach") => json!({
                        "janus": "success",
                        "session_id": 7001,
                        "transaction": request["transaction"],
                        "data": {"id": 42},
                    }),
                    _ => continue,
                };
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
        });

        (format!("ws://{}", addr), handle)
    }

    fn test_config(url: String) -> SignalingConfig {
        SignalingConfig {
            url,
            attach_timeout_secs: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_establishes_gateway_session() {
        let (url, _server) = mock_gateway().await;
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();

        let channel = WebSocketChannel::open(test_config(url), inbound_tx)
            .await
            .unwrap();
        assert_eq!(channel.session_id(), None);

        channel.connect().await.unwrap();
        assert_eq!(channel.session_id(), Some(7001));
    }

    #[tokio::test]
    async fn test_attach_confirmation_reaches_inbound_channel() {
        let (url, _server) = mock_gateway().await;
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        let channel = WebSocketChannel::open(test_config(url), inbound_tx)
            .await
            .unwrap();
        channel.connect().await.unwrap();
        channel.register_streaming().await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
            .await
            .expect("no attach confirmation")
            .unwrap();
        assert!(matches!(message.kind, InboundKind::StreamingAttached));
        assert_eq!(message.session_id, Some(7001));
    }

    #[tokio::test]
    async fn test_control_requires_attached_capability() {
        let (url, _server) = mock_gateway().await;
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        let channel = WebSocketChannel::open(test_config(url), inbound_tx)
            .await
            .unwrap();
        channel.connect().await.unwrap();

        // not attached yet
        let result = channel.send_control(ControlRequest::List).await;
        assert!(matches!(result, Err(Error::Signaling(_))));

        channel.register_streaming().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
            .await
            .expect("no attach confirmation")
            .unwrap();

        channel.send_control(ControlRequest::List).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_times_out_against_silent_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // swallow everything, reply to nothing
            while let Some(Ok(_)) = ws.next().await {}
        });

        let config = SignalingConfig {
            url: format!("ws://{}", addr),
            attach_timeout_secs: 1,
            ..Default::default()
        };
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let channel = WebSocketChannel::open(config, inbound_tx).await.unwrap();

        let result = channel.connect().await;
        assert!(matches!(result, Err(Error::WebSocket(_))));
    }

    #[tokio::test]
    async fn test_connector_opens_working_channel() {
        let (url, _server) = mock_gateway().await;
        let connector = WebSocketConnector::new(test_config(url));
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();

        let channel = connector.open(inbound_tx).await.unwrap();
        channel.connect().await.unwrap();
        assert_eq!(channel.session_id(), Some(7001));
    }

    #[tokio::test]
    async fn test_disconnect_clears_session_state() {
        let (url, _server) = mock_gateway().await;
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();

        let channel = WebSocketChannel::open(test_config(url), inbound_tx)
            .await
            .unwrap();
        channel.connect().await.unwrap();
        assert!(channel.session_id().is_some());

        channel.disconnect().await.unwrap();
        assert_eq!(channel.session_id(), None);
    }
}
