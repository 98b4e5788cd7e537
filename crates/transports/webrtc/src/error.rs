//! Error types for session orchestration

use std::time::Duration;

/// Result type alias using the orchestration Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating viewing sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation referenced an unknown session identifier
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Signaling channel failure
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// The gateway process could not be launched or never became ready
    #[error("Gateway spawn error: {0}")]
    GatewaySpawn(String),

    /// Gateway teardown failed (usually: it was not running)
    #[error("Gateway stop error: {0}")]
    GatewayStopped(String),

    /// The streaming capability was not confirmed in time
    #[error("Streaming capability not attached within {0:?}")]
    AttachTimeout(Duration),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Collaborator error surfaced through the core abstractions
    #[error(transparent)]
    Core(#[from] peercam_core::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SessionNotFound("abc123".to_string());
        assert_eq!(err.to_string(), "Session not found: abc123");

        let err = Error::GatewaySpawn("no such file".to_string());
        assert_eq!(err.to_string(), "Gateway spawn error: no such file");
    }

    #[test]
    fn test_core_error_conversion() {
        let core = peercam_core::Error::Pipeline("stream stalled".to_string());
        let err = Error::from(core);
        assert_eq!(err.to_string(), "Pipeline error: stream stalled");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
