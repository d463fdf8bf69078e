//! SigWire JSON Codec
//!
//! Signaling frames travel as WebSocket text messages holding one JSON
//! encoded [`Message`]. Decoding ignores unknown fields and fills only the
//! fields present in the frame.

use crate::types::Message;
use crate::{Error, Result};

/// Encode a message to a JSON text frame
#[inline]
pub fn encode(message: &Message) -> Result<String> {
    serde_json::to_string(message).map_err(Error::encode)
}

/// Decode a JSON text frame
#[inline]
pub fn decode(frame: &str) -> Result<Message> {
    serde_json::from_str(frame).map_err(Error::decode)
}

/// Decode a frame received as raw bytes
pub fn decode_bytes(frame: &[u8]) -> Result<Message> {
    serde_json::from_slice(frame).map_err(Error::decode)
}
