//! WebRTC viewing-session orchestration for peercam
//!
//! Lets remote viewers establish live video sessions with the device's
//! camera through an external signaling gateway and the device-local video
//! pipeline:
//!
//! ```text
//! Remote viewer (message bus)
//!   ↓ viewing request / session description / ICE candidate
//! SessionManager ─────────── registry of active sessions (one lock)
//!   ├─ GatewayProcess        external signaling gateway (child process)
//!   ├─ PeerSession           per-viewer unit
//!   │   ├─ SignalingChannel  WebSocket connection to the gateway
//!   │   └─ KeepaliveWorker   periodic heartbeat
//!   ├─ StreamController      device video pipeline (collaborator)
//!   └─ EventSink             message-bus delivery (collaborator)
//! ```
//!
//! The gateway process and the video pipeline run exactly while at least
//! one session is registered: the first session starts them, closing the
//! last one stops them. Failed session starts unwind completely; the
//! registry never holds a half-initialized entry.
//!
//! # Example
//!
//! ```ignore
//! use peercam_core::WebRtcConfig;
//! use peercam_webrtc::signaling::WebSocketConnector;
//! use peercam_webrtc::SessionManager;
//! use std::sync::Arc;
//!
//! let config = WebRtcConfig::default();
//! let connector = Arc::new(WebSocketConnector::new(config.signaling.clone()));
//! let manager = SessionManager::new(config, connector, pipeline, events)?;
//!
//! if let Some(session_id) = manager.start_peer_session("viewer-1").await {
//!     manager.prepare_streaming(&session_id).await;
//!     // ... relay descriptions and candidates ...
//!     manager.close_peer_session(&session_id).await;
//! }
//! ```

pub mod error;
pub mod gateway;
pub mod session;
pub mod signaling;

pub use error::{Error, Result};
pub use session::{PeerSession, PeerState, SessionEntry, SessionManager};
