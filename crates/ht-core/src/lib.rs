//! hubtrust core - trust and message integrity for chat over an untrusted hub.
//!
//! This crate implements:
//! - The key directory (username to last announced public key)
//! - The local identity state machine (impersonation and revert)
//! - The command grammar for the input line
//! - Trust evaluation of inbound envelopes
//! - The session controller tying these to hub events
//!
//! Everything here is synchronous. Events are processed one at a time in the
//! order the transport delivers them, so no locking is needed.

#![forbid(unsafe_code)]

// State
pub mod directory;
pub mod identity;

// Services
pub mod command;
pub mod session;
pub mod trust;

// Seams
pub mod errors;
pub mod transport;

// Supporting modules
pub mod harness;

#[cfg(test)]
mod proptests;

pub use command::Command;
pub use directory::{KeyChanged, KeyDirectory};
pub use errors::CoreError;
pub use identity::{IdentityContext, IdentityState, KeyParams, Registration, RevertPolicy};
pub use session::{Notice, Output, SessionConfig, SessionController, SessionStats};
pub use transport::{HubTransport, TransportError};
pub use trust::{Anomaly, Evaluation, TrustEvaluator, Verdict};
