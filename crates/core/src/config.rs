//! Configuration types for the streaming orchestrator

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the WebRTC streaming orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebRtcConfig {
    /// Signaling channel settings
    pub signaling: SignalingConfig,

    /// Gateway process settings
    pub gateway: GatewayConfig,

    /// Video encoding served by the device pipeline
    pub video_encoding: VideoEncoding,
}

/// Settings for the per-session signaling channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Gateway WebSocket endpoint (ws:// or wss://)
    pub url: String,

    /// Pre-shared API secret attached to every request (empty = none)
    pub secret: String,

    /// Heartbeat interval in seconds (default: 30)
    pub keepalive_interval_secs: u64,

    /// Bound on handshake steps and the capability-attach confirmation
    /// wait, in seconds (default: 10)
    pub attach_timeout_secs: u64,
}

/// Settings for the external gateway process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway executable path
    pub command: PathBuf,

    /// Extra launch arguments (the stock gateway takes none)
    pub args: Vec<String>,

    /// Line fragment on the gateway's standard output that signals readiness
    pub ready_marker: String,

    /// Delay after the readiness marker before the gateway is considered
    /// usable, in milliseconds (default: 3000)
    pub settle_delay_ms: u64,

    /// Bound on the readiness wait in seconds; `None` waits forever
    /// (default: 30)
    pub startup_timeout_secs: Option<u64>,
}

/// Video encodings the device pipeline can serve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoding {
    /// H.264 (default)
    #[default]
    H264,
    /// VP8
    Vp8,
}

impl VideoEncoding {
    /// Numeric identifier of the gateway stream carrying this encoding
    pub fn stream_id(&self) -> u32 {
        match self {
            VideoEncoding::H264 => 1,
            VideoEncoding::Vp8 => 2,
        }
    }

    /// Resolve a raw configuration setting
    ///
    /// `"h264"` selects H.264; any other value falls back to VP8.
    pub fn from_setting(value: &str) -> Self {
        if value == "h264" {
            VideoEncoding::H264
        } else {
            VideoEncoding::Vp8
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8188".to_string(),
            secret: String::new(),
            keepalive_interval_secs: 30,
            attach_timeout_secs: 10,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("/opt/janus/bin/janus"),
            args: Vec::new(),
            ready_marker: "HTTP/Janus sessions watchdog started".to_string(),
            settle_delay_ms: 3000,
            startup_timeout_secs: Some(30),
        }
    }
}

impl SignalingConfig {
    /// Heartbeat interval as a [`Duration`]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Attach/handshake bound as a [`Duration`]
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout_secs)
    }
}

impl GatewayConfig {
    /// Post-readiness settle delay as a [`Duration`]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Readiness wait bound as a [`Duration`], when one is configured
    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_secs.map(Duration::from_secs)
    }
}

impl WebRtcConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling.url` is not a WebSocket URL
    /// - `signaling.keepalive_interval_secs` or
    ///   `signaling.attach_timeout_secs` is zero
    /// - `gateway.ready_marker` is empty
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling.url.starts_with("ws://") && !self.signaling.url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling url must start with ws:// or wss://, got {}",
                self.signaling.url
            )));
        }

        if self.signaling.keepalive_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "keepalive_interval_secs must be non-zero".to_string(),
            ));
        }

        if self.signaling.attach_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "attach_timeout_secs must be non-zero".to_string(),
            ));
        }

        if self.gateway.ready_marker.is_empty() {
            return Err(Error::InvalidConfig(
                "gateway ready_marker must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
