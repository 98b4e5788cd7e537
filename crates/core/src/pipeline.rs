//! Device video pipeline control

use async_trait::async_trait;

/// Controller for the device-local video capture/encode pipeline
///
/// The pipeline itself is an external collaborator; the orchestrator only
/// acquires the camera and starts/stops the stream, and derives both from
/// session-registry occupancy.
#[async_trait]
pub trait StreamController: Send + Sync {
    /// Acquire the camera resource
    async fn open_camera(&self) -> crate::Result<()>;

    /// Start serving the video stream
    async fn start_video_stream(&self) -> crate::Result<()>;

    /// Stop serving the video stream
    async fn stop_video_stream(&self) -> crate::Result<()>;
}
