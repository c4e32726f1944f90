//! Simulator Control Protocol
//!
//! This crate provides the message types and framing used between the
//! dashcap capture driver and a driving simulator:
//!
//! - **Geometry**: positions ([`Vec3`]) and rotations ([`Quat`])
//! - **Messages**: [`SimRequest`] from the driver, [`SimResponse`] from the simulator
//! - **Framing**: length-prefixed JSON headers with an optional binary payload
//!
//! # Architecture
//!
//! The link is strictly request/response: the driver writes one request
//! frame and blocks until the matching response frame arrives. Camera
//! buffers are too large for JSON, so they travel in the frame payload and
//! the header only describes their layout ([`CameraFrameHeader`]).
//!
//! # Example
//!
//! ```rust
//! use dash_protocol::{encode_message, FrameCodec, ProtocolCodec, SimRequest};
//!
//! let bytes = encode_message(&SimRequest::Step { count: 300 }).unwrap();
//!
//! let mut codec = FrameCodec::<SimRequest>::new();
//! codec.push_bytes(&bytes);
//!
//! let packet = codec.next_packet().unwrap().unwrap();
//! assert_eq!(packet.message, SimRequest::Step { count: 300 });
//! ```

pub mod codec;
pub mod error;
pub mod geometry;
pub mod message;

pub use codec::{encode_message, FrameCodec, Packet, MAX_FRAME_LEN};
pub use error::{ParseError, ProtocolError};
pub use geometry::{Quat, Vec3};
pub use message::{
    AiMode, CameraBuffers, CameraFrameHeader, CameraSpec, ScenarioSpec, SensorKind, SimRequest,
    SimResponse, SpeedMode, VehicleSnapshot, VehicleSpec, LUA_FORCE_TELEPORT_TRAFFIC,
    LUA_UNPAUSE_PHYSICS, PROTOCOL_VERSION,
};

/// Trait for codecs that parse incoming data streams into packets
pub trait ProtocolCodec {
    /// The message type carried in frame headers
    type Message;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete packet from the buffer
    ///
    /// Returns `Ok(None)` when more data is needed.
    fn next_packet(&mut self) -> Result<Option<codec::Packet<Self::Message>>, ParseError>;

    /// Clear the internal buffer
    fn clear(&mut self);
}
