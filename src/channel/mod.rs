//! Real-time progress channel
//!
//! A [`ProgressChannel`] emits named events to a remote peer and hands out
//! [`Subscription`]s for inbound ones. The socket implementation speaks
//! Socket.IO over WebSocket; the memory implementation backs tests and
//! offline mode.

mod memory;
pub mod packet;
mod registry;
mod socket;

pub use memory::{spawn_scripted_peer, MemoryChannel};
pub use packet::PacketError;
pub use registry::{HandlerRegistry, Subscription};
pub use socket::{websocket_url, SocketIoChannel};

use thiserror::Error;

/// Outbound event requesting an install; payload is the model name
pub const INSTALL_EVENT: &str = "install_model";

/// Inbound event carrying one line of progress text
pub const PROGRESS_EVENT: &str = "progress";

/// Errors raised by channel implementations
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("server refused namespace '{namespace}': {message}")]
    Refused { namespace: String, message: String },

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("channel is closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),
}

/// A bidirectional named-event connection
pub trait ProgressChannel: Send + Sync {
    /// Queue `event` with a single string payload. Does not wait for any
    /// response from the peer.
    fn emit(&self, event: &str, payload: &str) -> Result<(), ChannelError>;

    /// Register one handler for `event`
    fn subscribe(&self, event: &str) -> Subscription;
}
