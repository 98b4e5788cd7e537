//! Core abstractions for peercam
//!
//! This crate defines what the session orchestrator consumes but does not
//! implement: configuration types, the error taxonomy shared with
//! collaborators, and the traits for the two external collaborators every
//! deployment must provide: the device video pipeline
//! ([`StreamController`]) and the message-bus event delivery
//! ([`EventSink`]).
//!
//! The orchestration itself lives in `peercam-webrtc`.

pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;

pub use config::{GatewayConfig, SignalingConfig, VideoEncoding, WebRtcConfig};
pub use error::{Error, Result};
pub use events::{ClientEvent, EventSink, EventType};
pub use pipeline::StreamController;
