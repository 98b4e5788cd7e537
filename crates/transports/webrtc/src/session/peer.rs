//! Per-viewer session: signaling channel and keepalive ownership

use crate::session::SessionManager;
use crate::signaling::{
    InboundKind, InboundMessage, KeepaliveWorker, SignalingChannel, SignalingConnector,
};
use crate::{Error, Result};
use parking_lot::RwLock;
use peercam_core::{ClientEvent, EventSink, EventType, SignalingConfig};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, warn};

/// Lifecycle states of a [`PeerSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Channel opened, gateway session not yet confirmed
    Created,
    /// Waiting for the streaming capability to attach
    Attaching,
    /// Relaying signaling for a live viewer
    Active,
    /// Teardown in progress
    Closing,
    /// Fully torn down
    Closed,
}

struct PeerInner {
    channel: Option<Arc<dyn SignalingChannel>>,
    keepalive: Option<KeepaliveWorker>,
}

/// One remote viewer's session
///
/// Owns its signaling channel and keepalive worker exclusively. The
/// orchestrator's registry lock serializes all calls for a given session,
/// so the only internal synchronization is for the handles themselves.
pub struct PeerSession {
    client_id: String,
    session_id: u64,
    state: RwLock<PeerState>,
    inner: Mutex<PeerInner>,
}

impl PeerSession {
    /// Open, connect, and attach a session for `client_id`
    ///
    /// Drives the full start sequence: open the signaling channel, connect
    /// it, wire inbound dispatch, request the streaming capability, start
    /// the keepalive worker, then wait (bounded) for the attach
    /// confirmation. Everything already started is torn down again before
    /// an error is returned, so a failed start leaves nothing behind.
    pub(crate) async fn start(
        client_id: &str,
        manager: Weak<SessionManager>,
        connector: &dyn SignalingConnector,
        events: Arc<dyn EventSink>,
        config: &SignalingConfig,
    ) -> Result<Arc<Self>> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let channel = connector.open(inbound_tx).await?;
        if let Err(e) = channel.connect().await {
            let _ = channel.disconnect().await;
            return Err(e);
        }

        let session_id = match channel.session_id() {
            Some(id) => id,
            None => {
                let _ = channel.disconnect().await;
                return Err(Error::Signaling(
                    "channel reported no session id after connect".to_string(),
                ));
            }
        };

        let session = Arc::new(Self {
            client_id: client_id.to_string(),
            session_id,
            state: RwLock::new(PeerState::Created),
            inner: Mutex::new(PeerInner {
                channel: Some(channel.clone()),
                keepalive: None,
            }),
        });
        session.set_state(PeerState::Attaching);

        let attached = Arc::new(Notify::new());
        tokio::spawn(dispatch_inbound(
            inbound_rx,
            session_id,
            client_id.to_string(),
            manager,
            events,
            attached.clone(),
        ));

        if let Err(e) = channel.register_streaming().await {
            session.close().await;
            return Err(e);
        }

        let keepalive = KeepaliveWorker::spawn(channel, config.keepalive_interval());
        session.inner.lock().await.keepalive = Some(keepalive);

        let timeout = config.attach_timeout();
        if tokio::time::timeout(timeout, attached.notified())
            .await
            .is_err()
        {
            warn!(
                "Session {} streaming capability not confirmed within {:?}",
                session_id, timeout
            );
            session.close().await;
            return Err(Error::AttachTimeout(timeout));
        }

        session.set_state(PeerState::Active);
        debug!("Session {} active for client {}", session_id, client_id);
        Ok(session)
    }

    /// Remote client this session belongs to
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Gateway session id (doubles as the registry key)
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> PeerState {
        *self.state.read()
    }

    /// Signaling channel handle, while the session is open
    pub(crate) async fn channel(&self) -> Option<Arc<dyn SignalingChannel>> {
        self.inner.lock().await.channel.clone()
    }

    /// Tear the session down
    ///
    /// Stops and joins the keepalive worker before the channel disconnects,
    /// so no heartbeat can race the teardown. Idempotent: a second call is
    /// a no-op.
    pub async fn close(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, PeerState::Closing | PeerState::Closed) {
                debug!("Session {} already closed", self.session_id);
                return;
            }
            *state = PeerState::Closing;
        }
        debug!("Session {} closing", self.session_id);

        let mut inner = self.inner.lock().await;

        if let Some(keepalive) = inner.keepalive.take() {
            keepalive.stop().await;
        }

        if let Some(channel) = inner.channel.take() {
            if let Err(e) = channel.disconnect().await {
                warn!("Session {} channel disconnect failed: {}", self.session_id, e);
            }
        }

        self.set_state(PeerState::Closed);
    }

    fn set_state(&self, new_state: PeerState) {
        let mut state = self.state.write();
        if *state != new_state {
            debug!(
                "Session {} state transition: {:?} -> {:?}",
                self.session_id, *state, new_state
            );
            *state = new_state;
        }
    }
}

/// Forward inbound gateway traffic for one session
///
/// Messages tagged with a different session id are ignored; a hangup closes
/// the session through the orchestrator (detached, so teardown never
/// cancels the task driving it); session descriptions are relayed to the
/// viewer as `getSdp` events.
async fn dispatch_inbound(
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    session_id: u64,
    client_id: String,
    manager: Weak<SessionManager>,
    events: Arc<dyn EventSink>,
    attached: Arc<Notify>,
) {
    while let Some(message) = inbound.recv().await {
        if let Some(id) = message.session_id {
            if id != session_id {
                continue;
            }
        }

        match message.kind {
            InboundKind::StreamingAttached => {
                attached.notify_one();
            }
            InboundKind::Hangup => {
                debug!("Gateway hangup for session {}", session_id);
                if let Some(manager) = manager.upgrade() {
                    let key = session_id.to_string();
                    tokio::spawn(async move {
                        manager.close_peer_session(&key).await;
                    });
                }
            }
            InboundKind::RemoteDescription(payload) => {
                let event = ClientEvent::new(&client_id, EventType::GetSdp, Some(payload));
                if let Err(e) = events.send(&event).await {
                    warn!(
                        "Failed to relay session description to {}: {}",
                        client_id, e
                    );
                }
            }
            InboundKind::Other => {}
        }
    }

    debug!("Inbound dispatch for session {} terminated", session_id);
}
