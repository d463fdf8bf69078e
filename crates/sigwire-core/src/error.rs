//! Error types for SigWire messages

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message model errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// JSON encoding error
    #[error("encode error: {0}")]
    Encode(String),

    /// JSON decoding error
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    pub(crate) fn decode(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }

    pub(crate) fn encode(e: serde_json::Error) -> Self {
        Error::Encode(e.to_string())
    }
}
