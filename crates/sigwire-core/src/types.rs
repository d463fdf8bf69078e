//! Signaling message definitions

use serde::{Deserialize, Deserializer, Serialize};

/// Message types a PeerJS rendezvous server is known to emit or relay.
///
/// `Message::msg_type` stays a plain string on the wire; this table only
/// gives the calling protocol layer something to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerMessageType {
    /// Server accepted the connection
    Open,
    /// Server reported an error
    Error,
    /// Requested id is already in use
    IdTaken,
    /// API key was rejected
    InvalidKey,
    /// Remote peer left
    Leave,
    /// Relayed message could not be delivered in time
    Expire,
    Offer,
    Answer,
    Candidate,
    Heartbeat,
}

impl ServerMessageType {
    pub const ALL: [ServerMessageType; 10] = [
        ServerMessageType::Open,
        ServerMessageType::Error,
        ServerMessageType::IdTaken,
        ServerMessageType::InvalidKey,
        ServerMessageType::Leave,
        ServerMessageType::Expire,
        ServerMessageType::Offer,
        ServerMessageType::Answer,
        ServerMessageType::Candidate,
        ServerMessageType::Heartbeat,
    ];

    pub fn parse(val: &str) -> Option<Self> {
        match val {
            "OPEN" => Some(ServerMessageType::Open),
            "ERROR" => Some(ServerMessageType::Error),
            "ID-TAKEN" => Some(ServerMessageType::IdTaken),
            "INVALID-KEY" => Some(ServerMessageType::InvalidKey),
            "LEAVE" => Some(ServerMessageType::Leave),
            "EXPIRE" => Some(ServerMessageType::Expire),
            "OFFER" => Some(ServerMessageType::Offer),
            "ANSWER" => Some(ServerMessageType::Answer),
            "CANDIDATE" => Some(ServerMessageType::Candidate),
            "HEARTBEAT" => Some(ServerMessageType::Heartbeat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMessageType::Open => "OPEN",
            ServerMessageType::Error => "ERROR",
            ServerMessageType::IdTaken => "ID-TAKEN",
            ServerMessageType::InvalidKey => "INVALID-KEY",
            ServerMessageType::Leave => "LEAVE",
            ServerMessageType::Expire => "EXPIRE",
            ServerMessageType::Offer => "OFFER",
            ServerMessageType::Answer => "ANSWER",
            ServerMessageType::Candidate => "CANDIDATE",
            ServerMessageType::Heartbeat => "HEARTBEAT",
        }
    }
}

impl std::fmt::Display for ServerMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session description kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// A session description exchanged during offer/answer negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Message payload.
///
/// Which fields are populated depends on the enclosing message type. Unset
/// fields are left out of the encoding entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Connection kind (`data`, `media`)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Application metadata, validated by the consuming protocol layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliable: Option<bool>,
    /// ICE candidate string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

impl Payload {
    /// True when no field is populated
    pub fn is_empty(&self) -> bool {
        *self == Payload::default()
    }
}

/// Read a field that may be absent or `null` as its zero value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A signaling message
///
/// Decoding fills only the fields present in the frame. Missing or `null`
/// fields keep their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub msg_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: Payload,
    #[serde(default, deserialize_with = "null_as_default")]
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            src: src.into(),
            ..Default::default()
        }
    }

    /// Set the destination peer id
    pub fn with_dst(mut self, dst: impl Into<String>) -> Self {
        self.dst = Some(dst.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// The known message type, if `msg_type` is one
    pub fn message_type(&self) -> Option<ServerMessageType> {
        ServerMessageType::parse(&self.msg_type)
    }
}
