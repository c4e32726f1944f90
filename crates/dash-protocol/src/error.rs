//! Error types for simulator frame parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing frame data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Declared frame length exceeds the protocol limit
    #[error("frame too large: {len} bytes (limit {limit})")]
    FrameTooLarge { len: usize, limit: usize },

    /// Header is not valid JSON for the expected message type
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Payload length does not match what the header describes
    #[error("payload length mismatch: header describes {expected} bytes, frame carries {actual}")]
    PayloadMismatch { expected: usize, actual: usize },

    /// One camera buffer does not have the size its resolution implies
    #[error("{buffer} buffer is {actual} bytes, resolution implies {expected}")]
    BufferMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Message could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// Peer answered with a response that does not fit the request
    #[error("unexpected response to {request}: got {response}")]
    UnexpectedResponse {
        request: &'static str,
        response: &'static str,
    },

    /// Peer speaks a different protocol revision
    #[error("protocol version mismatch: local {local}, remote {remote}")]
    VersionMismatch { local: u32, remote: u32 },
}
