//! Newline-delimited JSON framing.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::events::ServerEvent;

/// Maximum size of one encoded event, excluding the trailing newline (64KB).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("line too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),

    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode an event as one line, newline included.
pub fn encode_line<T: Serialize>(event: &T) -> Result<String, WireError> {
    let mut line = serde_json::to_string(event)?;
    if line.len() > MAX_LINE_BYTES {
        return Err(WireError::TooLarge(line.len(), MAX_LINE_BYTES));
    }
    line.push('\n');
    Ok(line)
}

/// Decode one line (with or without its trailing newline).
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, WireError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() > MAX_LINE_BYTES {
        return Err(WireError::TooLarge(line.len(), MAX_LINE_BYTES));
    }
    Ok(serde_json::from_str(line)?)
}

/// Encode a key roster as one or more `init` lines, each within
/// [`MAX_LINE_BYTES`]. Entries keep their order; an empty roster still
/// yields one (empty) `init`.
pub fn encode_init_lines(roster: &[(String, String)]) -> Result<Vec<String>, WireError> {
    split_init(roster, MAX_LINE_BYTES)?
        .into_iter()
        .map(|chunk| encode_line(&ServerEvent::Init(chunk.to_vec())))
        .collect()
}

pub(crate) fn split_init(
    roster: &[(String, String)],
    limit: usize,
) -> Result<Vec<&[(String, String)]>, WireError> {
    let envelope = serde_json::to_string(&ServerEvent::Init(Vec::new()))?.len();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = envelope;

    for (i, entry) in roster.iter().enumerate() {
        let entry_len = serde_json::to_string(entry)?.len();
        if envelope + entry_len > limit {
            return Err(WireError::TooLarge(envelope + entry_len, limit));
        }
        // Entries after the first in a chunk need a comma.
        let grown = size + entry_len + usize::from(i > start);
        if grown > limit {
            chunks.push(&roster[start..i]);
            start = i;
            size = envelope + entry_len;
        } else {
            size = grown;
        }
    }
    chunks.push(&roster[start..]);
    Ok(chunks)
}
