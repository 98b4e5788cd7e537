//! Error types shared by peercam collaborators

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by configuration handling and collaborator adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Video pipeline failure (camera open or stream start/stop)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Event delivery to a remote client failed
    #[error("Event sink error: {0}")]
    EventSink(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
