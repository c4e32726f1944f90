//! Error types for the capture engine

use thiserror::Error;

/// Errors that can occur while capturing
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Map has no spawn points in the catalog
    #[error("unknown map: {0}")]
    UnknownMap(String),

    /// Configuration rejected before the run started
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Simulator reported a failure for a request
    #[error("simulator error during {request}: {message}")]
    Simulator {
        /// Request that failed
        request: &'static str,
        /// Message reported by the simulator
        message: String,
    },

    /// Connection closed while waiting for a response
    #[error("simulator disconnected")]
    Disconnected,

    /// Camera data did not match the configured resolution
    #[error("camera frame malformed: {0}")]
    MalformedFrame(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Protocol error
    #[error("protocol error: {0}")]
    ProtocolError(#[from] dash_protocol::ProtocolError),

    /// Image encoding error
    #[error("image error: {0}")]
    ImageError(#[from] image::ImageError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<dash_protocol::ParseError> for CaptureError {
    fn from(err: dash_protocol::ParseError) -> Self {
        CaptureError::ProtocolError(err.into())
    }
}
