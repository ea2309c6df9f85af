//! ht-hub: broadcast hub for hubtrust
//!
//! The hub relays events between clients and keeps the roster of announced
//! public keys. It checks nothing: every registration is accepted and every
//! message is forwarded as sent. Clients do all trust evaluation.

pub mod config;
pub mod server;

pub use config::{HubArgs, ServerConfig};
pub use server::{HubError, HubServer};
