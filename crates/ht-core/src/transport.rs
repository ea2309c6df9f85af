//! The seam between the session and whatever carries events to the hub.

use async_trait::async_trait;
use thiserror::Error;

use ht_proto::{ClientEvent, ServerEvent, WireError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("hub disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

impl TransportError {
    /// Disconnects and IO failures end the session; a single bad line does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransportError::Wire(_))
    }
}

/// Ordered, bidirectional event channel to the broadcast hub.
///
/// Implementations must deliver events in the order the hub sent them. The
/// session relies on this to apply a sender's registration before that
/// sender's next message.
#[async_trait]
pub trait HubTransport: Send {
    /// Send one event to the hub.
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError>;

    /// Receive the next event. Returns `Disconnected` once the hub is gone.
    async fn recv(&mut self) -> Result<ServerEvent, TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}
