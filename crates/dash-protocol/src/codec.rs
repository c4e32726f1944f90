//! Length-prefixed frame codec
//!
//! # Format
//!
//! ```text
//! +----------------+-----------------+-------------+---------------+
//! | header_len u32 | payload_len u32 | JSON header | payload bytes |
//! |   big-endian   |   big-endian    |             |               |
//! +----------------+-----------------+-------------+---------------+
//! ```
//!
//! The header is a JSON-encoded message; the payload carries opaque bulk
//! data (camera buffers) and is empty for most messages.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ParseError, ProtocolError};
use crate::ProtocolCodec;

/// Size of the two length prefixes
pub const PREFIX_LEN: usize = 8;

/// Largest frame (header plus payload) either side will accept
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// A decoded message together with its payload
#[derive(Debug, Clone, PartialEq)]
pub struct Packet<M> {
    pub message: M,
    pub payload: Vec<u8>,
}

impl<M> Packet<M> {
    /// A packet without payload
    pub fn new(message: M) -> Self {
        Self {
            message,
            payload: Vec::new(),
        }
    }

    /// A packet carrying bulk data
    pub fn with_payload(message: M, payload: Vec<u8>) -> Self {
        Self { message, payload }
    }
}

impl<M: Serialize> Packet<M> {
    /// Encode this packet to its wire format
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let header =
            serde_json::to_vec(&self.message).map_err(|e| ProtocolError::Encode(e.to_string()))?;

        let total = header.len() + self.payload.len();
        if total > MAX_FRAME_LEN {
            return Err(ParseError::FrameTooLarge {
                len: total,
                limit: MAX_FRAME_LEN,
            }
            .into());
        }

        let mut out = Vec::with_capacity(PREFIX_LEN + total);
        out.extend_from_slice(&(header.len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Encode a message without payload
pub fn encode_message<M: Serialize>(message: &M) -> Result<Vec<u8>, ProtocolError> {
    let header = serde_json::to_vec(message).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    let mut out = Vec::with_capacity(PREFIX_LEN + header.len());
    out.extend_from_slice(&(header.len() as u32).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&header);
    Ok(out)
}

/// Streaming frame codec
///
/// Bytes are pushed as they arrive from the stream; complete frames are
/// extracted one at a time. `M` is the message type expected in headers
/// (`SimRequest` on the simulator side, `SimResponse` on the driver side).
pub struct FrameCodec<M> {
    buffer: Vec<u8>,
    _message: PhantomData<fn() -> M>,
}

impl<M> FrameCodec<M> {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            _message: PhantomData,
        }
    }

    /// Number of bytes waiting for a complete frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn read_prefix(&self) -> Option<(usize, usize)> {
        if self.buffer.len() < PREFIX_LEN {
            return None;
        }
        let header_len = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;
        let payload_len = u32::from_be_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ]) as usize;
        Some((header_len, payload_len))
    }
}

impl<M> Default for FrameCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: DeserializeOwned> ProtocolCodec for FrameCodec<M> {
    type Message = M;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn next_packet(&mut self) -> Result<Option<Packet<M>>, ParseError> {
        let Some((header_len, payload_len)) = self.read_prefix() else {
            return Ok(None);
        };

        let total = header_len + payload_len;
        if total > MAX_FRAME_LEN {
            // The stream cannot be resynchronised after a bogus length
            self.buffer.clear();
            return Err(ParseError::FrameTooLarge {
                len: total,
                limit: MAX_FRAME_LEN,
            });
        }

        if self.buffer.len() < PREFIX_LEN + total {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..PREFIX_LEN + total).collect();
        let header = &frame[PREFIX_LEN..PREFIX_LEN + header_len];
        let payload = frame[PREFIX_LEN + header_len..].to_vec();

        let message = serde_json::from_slice(header).map_err(|e| {
            tracing::warn!("Failed to parse frame header: {}", e);
            ParseError::InvalidHeader(e.to_string())
        })?;

        Ok(Some(Packet { message, payload }))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{SimRequest, SimResponse};

    #[test]
    fn test_partial_frame_waits_for_more() {
        let bytes = encode_message(&SimRequest::Step { count: 30 }).unwrap();
        let mut codec = FrameCodec::<SimRequest>::new();

        codec.push_bytes(&bytes[..5]);
        assert_eq!(codec.next_packet().unwrap(), None);

        codec.push_bytes(&bytes[5..bytes.len() - 1]);
        assert_eq!(codec.next_packet().unwrap(), None);

        codec.push_bytes(&bytes[bytes.len() - 1..]);
        let packet = codec.next_packet().unwrap().unwrap();
        assert_eq!(packet.message, SimRequest::Step { count: 30 });
        assert!(packet.payload.is_empty());
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut bytes = encode_message(&SimRequest::Pause).unwrap();
        bytes.extend(encode_message(&SimRequest::HideHud).unwrap());

        let mut codec = FrameCodec::<SimRequest>::new();
        codec.push_bytes(&bytes);

        assert_eq!(codec.next_packet().unwrap().unwrap().message, SimRequest::Pause);
        assert_eq!(codec.next_packet().unwrap().unwrap().message, SimRequest::HideHud);
        assert_eq!(codec.next_packet().unwrap(), None);
    }

    #[test]
    fn test_payload_preserved() {
        let packet = Packet::with_payload(SimResponse::Ack, vec![1, 2, 3, 4, 5]);
        let bytes = packet.encode().unwrap();

        let mut codec = FrameCodec::<SimResponse>::new();
        codec.push_bytes(&bytes);
        assert_eq!(codec.next_packet().unwrap(), Some(packet));
    }

    #[test]
    fn test_invalid_header_is_consumed() {
        let mut bytes = Vec::new();
        let junk = b"{not json";
        bytes.extend_from_slice(&(junk.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(junk);
        bytes.extend(encode_message(&SimRequest::Resume).unwrap());

        let mut codec = FrameCodec::<SimRequest>::new();
        codec.push_bytes(&bytes);

        assert!(matches!(
            codec.next_packet(),
            Err(ParseError::InvalidHeader(_))
        ));
        // The following frame is still readable
        assert_eq!(codec.next_packet().unwrap().unwrap().message, SimRequest::Resume);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());

        let mut codec = FrameCodec::<SimRequest>::new();
        codec.push_bytes(&bytes);

        assert!(matches!(
            codec.next_packet(),
            Err(ParseError::FrameTooLarge { .. })
        ));
        assert_eq!(codec.buffered_len(), 0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn chunking_does_not_change_packets(
                counts in prop::collection::vec(any::<u32>(), 1..8),
                payload in prop::collection::vec(any::<u8>(), 0..256),
                chunk in 1usize..64,
            ) {
                let mut expected = Vec::new();
                let mut bytes = Vec::new();
                for count in counts {
                    let packet = Packet::with_payload(SimRequest::Step { count }, payload.clone());
                    bytes.extend(packet.encode().unwrap());
                    expected.push(packet);
                }

                let mut codec = FrameCodec::<SimRequest>::new();
                let mut decoded = Vec::new();
                for piece in bytes.chunks(chunk) {
                    codec.push_bytes(piece);
                    while let Some(packet) = codec.next_packet().unwrap() {
                        decoded.push(packet);
                    }
                }

                prop_assert_eq!(decoded, expected);
                prop_assert_eq!(codec.buffered_len(), 0);
            }
        }
    }
}
