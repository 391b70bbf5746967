//! Error types for the WebSocket bridge.

use thiserror::Error;

use crate::server::{FrameError, HandshakeError};

/// Common error type for the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket opening handshake failed.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// A frame could not be read from the wire.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for configuration or input values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Server lifecycle error (e.g. starting twice).
    #[error("server error: {0}")]
    Server(String),

    /// A relayed message could not be delivered to the host.
    #[error("delivery error: {0}")]
    Delivery(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
