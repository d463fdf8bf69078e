//! Client error types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Opening the WebSocket failed
    #[error("dial failed: {0}")]
    Dial(#[source] tungstenite::Error),

    #[error("write failed: {0}")]
    Write(#[source] tungstenite::Error),

    /// Closing the transport failed during teardown
    #[error("close failed: {0}")]
    Close(#[source] tungstenite::Error),

    /// Reading from the transport failed past the retry policy
    #[error("read failed: {0}")]
    Read(String),

    #[error("codec error: {0}")]
    Codec(#[from] sigwire_core::Error),
}
