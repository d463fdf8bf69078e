//! SigWire Client Library
//!
//! Signaling socket for PeerJS-compatible rendezvous servers.
//!
//! # Example
//!
//! ```ignore
//! use sigwire_client::{Socket, SocketEventType, SocketOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let socket = Socket::with_options(SocketOptions::default().host("sig.example.com"));
//!
//!     socket.subscribe(SocketEventType::Message, |event| {
//!         if let Some(msg) = &event.message {
//!             println!("{} from {}", msg.msg_type, msg.src);
//!         }
//!     });
//!
//!     socket.start("my-peer-id", "random-token").await?;
//!     socket.send(r#"{"type":"HEARTBEAT"}"#).await?;
//!     socket.close().await?;
//!     Ok(())
//! }
//! ```

pub mod emitter;
pub mod error;
pub mod options;
pub mod socket;

pub use emitter::{EventEmitter, SubscriptionId};
pub use error::{ClientError, Result};
pub use options::{ReadRetryPolicy, SocketOptions};
pub use socket::{Socket, SocketEvent, SocketEventType};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::emitter::EventEmitter;
    pub use crate::error::{ClientError, Result};
    pub use crate::options::SocketOptions;
    pub use crate::socket::{Socket, SocketEvent, SocketEventType};
    pub use sigwire_core::{Message, Payload, ServerMessageType, SessionDescription};
}
