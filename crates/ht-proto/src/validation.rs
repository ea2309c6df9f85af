//! Validation helpers for usernames carried in events and commands.

/// Maximum accepted username length in bytes.
pub const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("username is empty")]
    Empty,
    #[error("username is {0} bytes (max: {MAX_USERNAME_LEN})")]
    TooLong(usize),
    #[error("username contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Word characters only: ASCII letters, digits and underscore.
pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Check that `name` is a non-empty run of word characters.
///
/// This is the grammar command arguments use (`!secret bob`). Names received
/// from the hub are not required to satisfy it.
pub fn validate_username(name: &str) -> Result<(), UsernameError> {
    if name.is_empty() {
        return Err(UsernameError::Empty);
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong(name.len()));
    }
    match name.chars().find(|c| !is_word_char(*c)) {
        Some(c) => Err(UsernameError::InvalidChar(c)),
        None => Ok(()),
    }
}
