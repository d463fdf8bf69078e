//! SigWire Core
//!
//! Wire types and encoding for the PeerJS signaling protocol.
//!
//! This crate provides:
//! - Signaling message types ([`Message`], [`Payload`], [`SessionDescription`])
//! - The table of message types a rendezvous server is known to send ([`ServerMessageType`])
//! - JSON frame encoding/decoding ([`codec`])

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode, decode_bytes, encode};
pub use error::{Error, Result};
pub use types::*;

/// Path segment appended to the configured server path
pub const SIGNALING_PATH: &str = "/peerjs";

/// Default signaling server port
pub const DEFAULT_PORT: u16 = 443;

/// Default API key accepted by public PeerJS servers
pub const DEFAULT_KEY: &str = "peerjs";
