//! One viewing session end to end, with stub collaborators
//!
//! `/bin/sh` stands in for the gateway process; the video pipeline and the
//! message bus are logging stubs, so the example runs anywhere:
//!
//! ```sh
//! cargo run --example stream_session
//! ```

use async_trait::async_trait;
use peercam_core::{ClientEvent, EventSink, StreamController, WebRtcConfig};
use peercam_webrtc::signaling::{
    ControlRequest, IceCandidate, InboundKind, InboundMessage, RemoteDescription,
    SignalingChannel, SignalingConnector,
};
use peercam_webrtc::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

struct StubChannel {
    inbound: mpsc::UnboundedSender<InboundMessage>,
}

#[async_trait]
impl SignalingChannel for StubChannel {
    async fn connect(&self) -> peercam_webrtc::Result<()> {
        Ok(())
    }

    async fn register_streaming(&self) -> peercam_webrtc::Result<()> {
        let _ = self.inbound.send(InboundMessage {
            session_id: Some(1),
            kind: InboundKind::StreamingAttached,
        });
        Ok(())
    }

    async fn send_control(&self, request: ControlRequest) -> peercam_webrtc::Result<()> {
        info!("stub channel: control {:?}", request);
        Ok(())
    }

    async fn set_remote_description(&self, desc: &RemoteDescription) -> peercam_webrtc::Result<()> {
        info!("stub channel: remote description ({})", desc.kind);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> peercam_webrtc::Result<()> {
        info!("stub channel: candidate {}", candidate.candidate);
        Ok(())
    }

    async fn keepalive(&self) -> peercam_webrtc::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> peercam_webrtc::Result<()> {
        Ok(())
    }

    fn session_id(&self) -> Option<u64> {
        Some(1)
    }
}

struct StubConnector;

#[async_trait]
impl SignalingConnector for StubConnector {
    async fn open(
        &self,
        inbound: mpsc::UnboundedSender<InboundMessage>,
    ) -> peercam_webrtc::Result<Arc<dyn SignalingChannel>> {
        Ok(Arc::new(StubChannel { inbound }))
    }
}

struct StubPipeline;

#[async_trait]
impl StreamController for StubPipeline {
    async fn open_camera(&self) -> peercam_core::Result<()> {
        info!("stub pipeline: camera opened");
        Ok(())
    }

    async fn start_video_stream(&self) -> peercam_core::Result<()> {
        info!("stub pipeline: stream started");
        Ok(())
    }

    async fn stop_video_stream(&self) -> peercam_core::Result<()> {
        info!("stub pipeline: stream stopped");
        Ok(())
    }
}

struct StubSink;

#[async_trait]
impl EventSink for StubSink {
    async fn send(&self, event: &ClientEvent) -> peercam_core::Result<()> {
        info!(
            "stub sink: {:?} -> {}",
            event.data.event_type, event.data.client_id
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,peercam_webrtc=debug".into()),
        )
        .init();

    let mut config = WebRtcConfig::default();
    config.gateway.command = PathBuf::from("/bin/sh");
    config.gateway.args = vec![
        "-c".to_string(),
        "echo gateway up; exec sleep 300".to_string(),
    ];
    config.gateway.ready_marker = "gateway up".to_string();
    config.gateway.settle_delay_ms = 0;

    let manager = SessionManager::new(
        config,
        Arc::new(StubConnector),
        Arc::new(StubPipeline),
        Arc::new(StubSink),
    )?;

    let session_id = manager
        .start_peer_session("viewer-1")
        .await
        .ok_or_else(|| anyhow::anyhow!("session failed to start"))?;
    info!("session {} established", session_id);

    manager.prepare_streaming(&session_id).await;
    manager
        .set_remote_description_and_start(
            &session_id,
            RemoteDescription {
                kind: "answer".to_string(),
                sdp: "v=0".to_string(),
            },
        )
        .await;

    manager.close_peer_session(&session_id).await;
    info!("session closed; gateway running: {}", manager.gateway_running().await);

    Ok(())
}
