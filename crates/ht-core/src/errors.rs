//! Error types for hubtrust core.
//!
//! Only local failures are errors. Anything wrong with inbound data is an
//! [`Anomaly`](crate::trust::Anomaly) or a silent fallback, never an `Err`.

use thiserror::Error;

use crate::transport::TransportError;
use ht_crypto::envelope::CodecError;
use ht_crypto::keys::KeyError;
use ht_proto::validation::UsernameError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid username: {0}")]
    Username(#[from] UsernameError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no public key known for {0}")]
    UnknownRecipient(String),
}

impl CoreError {
    /// Whether the session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CoreError::Codec(_) | CoreError::Username(_) | CoreError::UnknownRecipient(_) => true,
            CoreError::Key(_) => true,
            CoreError::Transport(e) => !e.is_terminal(),
        }
    }
}
