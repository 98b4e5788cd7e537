//! Session registry and lifecycle orchestration

use crate::gateway::GatewayProcess;
use crate::session::peer::PeerSession;
use crate::signaling::{ControlRequest, IceCandidate, RemoteDescription, SignalingConnector};
use crate::Result;
use peercam_core::{ClientEvent, EventSink, EventType, StreamController, WebRtcConfig};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Registry entry for one viewing session
pub enum SessionEntry {
    /// On-device (non-remote) viewing session; no peer machinery
    Local,
    /// Remote viewer session
    Peer(Arc<PeerSession>),
}

struct ManagerState {
    sessions: HashMap<String, SessionEntry>,
    gateway: GatewayProcess,
}

/// Orchestrates viewing sessions, the gateway process, and the video
/// pipeline
///
/// Construct once at service startup and share via `Arc`; all callers go
/// through the same instance. One mutex guards the session registry and
/// the gateway handle together, and every operation that depends on
/// registry occupancy (including full session start/close sequences)
/// runs inside that critical section. Concurrent viewing requests
/// therefore serialize, and two of them can never race the gateway to
/// life twice.
///
/// The gateway process and the video pipeline run exactly while at least
/// one session is registered: the first session starts them, closing the
/// last one stops them (stream first, then gateway).
pub struct SessionManager {
    config: WebRtcConfig,
    connector: Arc<dyn SignalingConnector>,
    pipeline: Arc<dyn StreamController>,
    events: Arc<dyn EventSink>,
    state: Mutex<ManagerState>,
}

impl SessionManager {
    /// Create the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(
        config: WebRtcConfig,
        connector: Arc<dyn SignalingConnector>,
        pipeline: Arc<dyn StreamController>,
        events: Arc<dyn EventSink>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let gateway = GatewayProcess::new(config.gateway.clone());

        Ok(Arc::new(Self {
            config,
            connector,
            pipeline,
            events,
            state: Mutex::new(ManagerState {
                sessions: HashMap::new(),
                gateway,
            }),
        }))
    }

    /// Register an on-device viewing session
    ///
    /// Local sessions occupy the registry but have no gateway or pipeline
    /// side effects of their own.
    pub async fn start_local_session(&self) -> String {
        let mut state = self.state.lock().await;

        let session_id = Uuid::new_v4().simple().to_string();
        state
            .sessions
            .insert(session_id.clone(), SessionEntry::Local);

        info!("Local session {} started", session_id);
        session_id
    }

    /// Close an on-device viewing session
    ///
    /// Unknown ids are logged and ignored. Emptying the registry stops the
    /// stream pipeline and then the gateway.
    pub async fn close_local_session(&self, session_id: &str) {
        let mut state = self.state.lock().await;

        if state.sessions.remove(session_id).is_none() {
            warn!("Session [{}] not found", session_id);
            return;
        }

        info!("There are {} sessions left", state.sessions.len());
        self.teardown_if_idle(&mut state).await;
    }

    /// Start a viewing session for a remote client
    ///
    /// The first session brings the gateway up before anything else. On
    /// success the session is registered and its id returned; on any
    /// failure the started resources are unwound again and `None` is
    /// returned; a half-initialized session is never left registered.
    pub async fn start_peer_session(self: &Arc<Self>, client_id: &str) -> Option<String> {
        let mut state = self.state.lock().await;

        if state.sessions.is_empty() {
            // first viewer: the gateway must be up before a channel can connect
            if !self.start_gateway(&mut state).await {
                self.teardown_if_idle(&mut state).await;
                return None;
            }
        }

        let started = PeerSession::start(
            client_id,
            Arc::downgrade(self),
            self.connector.as_ref(),
            self.events.clone(),
            &self.config.signaling,
        )
        .await;

        match started {
            Ok(peer) => {
                let session_id = peer.session_id().to_string();
                state
                    .sessions
                    .insert(session_id.clone(), SessionEntry::Peer(peer));
                info!(
                    "Peer session {} started for client {}",
                    session_id, client_id
                );
                Some(session_id)
            }
            Err(e) => {
                warn!("Peer session for client {} failed to start: {}", client_id, e);
                self.teardown_if_idle(&mut state).await;
                None
            }
        }
    }

    /// Close a remote viewing session
    ///
    /// Unknown ids are logged and ignored (safe to call twice). The
    /// session's capability is destroyed, its channel and keepalive torn
    /// down, and the client notified with `stopConnection`. Emptying the
    /// registry stops the stream pipeline and then the gateway.
    pub async fn close_peer_session(&self, session_id: &str) {
        let mut state = self.state.lock().await;

        let peer = match state.sessions.get(session_id) {
            Some(SessionEntry::Peer(peer)) => peer.clone(),
            Some(SessionEntry::Local) => {
                warn!("Session [{}] is local, not a peer session", session_id);
                return;
            }
            None => {
                warn!("Session [{}] for peer not found", session_id);
                return;
            }
        };

        if let Some(channel) = peer.channel().await {
            if let Err(e) = channel.send_control(ControlRequest::Destroy).await {
                warn!("Failed to send destroy for session {}: {}", session_id, e);
            }
        }

        peer.close().await;
        self.notify_peer(EventType::StopConnection, peer.client_id(), None)
            .await;
        state.sessions.remove(session_id);

        info!("There are {} sessions left", state.sessions.len());
        self.teardown_if_idle(&mut state).await;
    }

    /// Bring the gateway up if no session has done so already
    pub async fn ensure_gateway_running(&self) -> bool {
        let mut state = self.state.lock().await;

        if state.sessions.is_empty() {
            self.start_gateway(&mut state).await
        } else {
            debug!("Gateway already running for {} sessions", state.sessions.len());
            true
        }
    }

    /// Bring the video pipeline up: camera open, stream running
    ///
    /// A pipeline that cannot start forces the gateway down; it is never
    /// left running in front of a broken stream.
    pub async fn ensure_pipeline_running(&self) -> bool {
        let result = async {
            self.pipeline.open_camera().await?;
            self.pipeline.start_video_stream().await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Video pipeline failed to start: {}", e);
                let mut state = self.state.lock().await;
                self.stop_gateway(&mut state).await;
                false
            }
        }
    }

    /// Prepare the session's streaming capability
    ///
    /// Sends `list`, resolves the configured encoding to its stream id,
    /// and sends `watch`.
    pub async fn prepare_streaming(&self, session_id: &str) {
        let state = self.state.lock().await;

        let peer = match Self::peer_entry(&state, session_id) {
            Some(peer) => peer.clone(),
            None => {
                warn!("Session [{}] for peer not found", session_id);
                self.broadcast_locked(&state, EventType::StopConnection, None)
                    .await;
                return;
            }
        };

        let channel = match peer.channel().await {
            Some(channel) => channel,
            None => return,
        };

        if let Err(e) = channel.send_control(ControlRequest::List).await {
            warn!("Failed to list streams for session {}: {}", session_id, e);
        }

        let stream_id = self.config.video_encoding.stream_id();
        if let Err(e) = channel
            .send_control(ControlRequest::Watch { id: stream_id })
            .await
        {
            warn!(
                "Failed to watch stream {} for session {}: {}",
                stream_id, session_id, e
            );
        }
    }

    /// Apply the viewer's session description and start media flow
    ///
    /// Relays the description, sends `start`, and brings the video
    /// pipeline up.
    pub async fn set_remote_description_and_start(
        &self,
        session_id: &str,
        desc: RemoteDescription,
    ) {
        let mut state = self.state.lock().await;

        let peer = match Self::peer_entry(&state, session_id) {
            Some(peer) => peer.clone(),
            None => {
                warn!("Session [{}] for peer not found", session_id);
                self.broadcast_locked(&state, EventType::StopConnection, None)
                    .await;
                return;
            }
        };

        if let Some(channel) = peer.channel().await {
            if let Err(e) = channel.set_remote_description(&desc).await {
                warn!(
                    "Failed to apply description for session {}: {}",
                    session_id, e
                );
            }
            if let Err(e) = channel.send_control(ControlRequest::Start).await {
                warn!("Failed to send start for session {}: {}", session_id, e);
            }
        }

        self.start_pipeline(&mut state).await;
    }

    /// Forward a connectivity candidate to a session's channel
    ///
    /// Unknown ids follow the same not-found policy as every other lookup:
    /// warn, best-effort broadcast, no-op.
    pub async fn add_ice_candidate(&self, session_id: &str, candidate: IceCandidate) {
        let state = self.state.lock().await;

        let peer = match Self::peer_entry(&state, session_id) {
            Some(peer) => peer.clone(),
            None => {
                warn!("Session [{}] for peer not found", session_id);
                self.broadcast_locked(&state, EventType::StopConnection, None)
                    .await;
                return;
            }
        };

        if let Some(channel) = peer.channel().await {
            if let Err(e) = channel.add_ice_candidate(&candidate).await {
                warn!(
                    "Failed to forward candidate for session {}: {}",
                    session_id, e
                );
            }
        }
    }

    /// Send one event to a single remote client
    pub async fn notify_peer(&self, event_type: EventType, client_id: &str, data: Option<Value>) {
        let event = ClientEvent::new(client_id, event_type, data);
        if let Err(e) = self.events.send(&event).await {
            warn!("Failed to deliver {:?} to {}: {}", event_type, client_id, e);
        }
    }

    /// Broadcast one event to every registered remote client
    pub async fn notify_peers(&self, event_type: EventType, data: Option<Value>) {
        let state = self.state.lock().await;
        self.broadcast_locked(&state, event_type, data).await;
    }

    /// Whether the gateway process is currently alive
    pub async fn gateway_running(&self) -> bool {
        self.state.lock().await.gateway.is_running()
    }

    /// OS process id of the gateway, if it is running
    pub async fn gateway_pid(&self) -> Option<u32> {
        self.state.lock().await.gateway.pid()
    }

    /// Number of registered sessions (local and peer)
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Whether a session id is currently registered
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.state.lock().await.sessions.contains_key(session_id)
    }

    fn peer_entry<'a>(
        state: &'a ManagerState,
        session_id: &str,
    ) -> Option<&'a Arc<PeerSession>> {
        match state.sessions.get(session_id) {
            Some(SessionEntry::Peer(peer)) => Some(peer),
            _ => None,
        }
    }

    async fn broadcast_locked(
        &self,
        state: &ManagerState,
        event_type: EventType,
        data: Option<Value>,
    ) {
        for entry in state.sessions.values() {
            // local sessions have no remote client to notify
            if let SessionEntry::Peer(peer) = entry {
                let event = ClientEvent::new(peer.client_id(), event_type, data.clone());
                if let Err(e) = self.events.send(&event).await {
                    warn!(
                        "Failed to deliver {:?} to {}: {}",
                        event_type,
                        peer.client_id(),
                        e
                    );
                }
            }
        }
    }

    async fn start_gateway(&self, state: &mut ManagerState) -> bool {
        match state.gateway.start().await {
            Ok(()) => true,
            Err(e) => {
                error!("Error starting gateway process: {}", e);
                self.broadcast_locked(state, EventType::StopConnection, None)
                    .await;
                false
            }
        }
    }

    async fn stop_gateway(&self, state: &mut ManagerState) -> bool {
        match state.gateway.stop().await {
            Ok(()) => {
                self.broadcast_locked(state, EventType::StopConnection, None)
                    .await;
                true
            }
            Err(e) => {
                warn!("Error stopping gateway: {}", e);
                false
            }
        }
    }

    /// Start the video stream; a failing pipeline forces the gateway down
    async fn start_pipeline(&self, state: &mut ManagerState) {
        if let Err(e) = self.pipeline.start_video_stream().await {
            error!("Video pipeline error: {}", e);
            self.stop_gateway(state).await;
        }
    }

    async fn stop_pipeline(&self) {
        if let Err(e) = self.pipeline.stop_video_stream().await {
            error!("Failed to stop video stream: {}", e);
        }
    }

    /// Stop shared resources once the registry is empty (stream first)
    async fn teardown_if_idle(&self, state: &mut ManagerState) {
        if !state.sessions.is_empty() {
            return;
        }

        self.stop_pipeline().await;
        if state.gateway.is_running() {
            self.stop_gateway(state).await;
        }
    }
}
