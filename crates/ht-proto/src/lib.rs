//! Wire format for the hubtrust chat protocol.
//!
//! Every event crossing the hub is a single JSON object on its own line:
//! `{"event": "<name>", "data": <payload>}`. The hub is untrusted and only
//! forwards these objects; all trust decisions happen in the clients.

#![forbid(unsafe_code)]

pub mod codec;
pub mod events;
pub mod framing;
pub mod validation;

#[cfg(test)]
mod proptests;

pub use codec::{decode_line, encode_init_lines, encode_line, WireError, MAX_LINE_BYTES};
pub use events::{ClientEvent, KeyRecord, ServerEvent, WireMessage};
pub use framing::{Frame, LineReader};
