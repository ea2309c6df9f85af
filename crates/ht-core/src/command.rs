//! Input-line grammar.
//!
//! Commands are recognised only in the modes that define them, and only when
//! the whole line matches. Everything else, including unknown `!` lines, is
//! sent as chat text unchanged.
//!
//! | mode      | command            | effect                    |
//! |-----------|--------------------|---------------------------|
//! | Encrypted | `!secret <user>`   | set conversation target   |
//! | Encrypted | `!exit`            | clear conversation target |
//! | Signed    | `!impersonate <u>` | post as `<u>`             |
//! | Signed    | `!exit`            | revert to registered name |

use ht_crypto::envelope::SecurityMode;
use ht_proto::validation::is_word_char;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send the line as a chat message.
    Send(String),
    EnterSecret(String),
    ExitSecret,
    Impersonate(String),
    RevertIdentity,
    /// Blank line; nothing to do.
    Empty,
}

impl Command {
    pub fn parse(line: &str, mode: SecurityMode) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Command::Empty;
        }

        match mode {
            SecurityMode::Encrypted => {
                if line == "!exit" {
                    return Command::ExitSecret;
                }
                if let Some(user) = argument(line, "!secret ") {
                    return Command::EnterSecret(user.to_string());
                }
            }
            SecurityMode::Signed => {
                if line == "!exit" {
                    return Command::RevertIdentity;
                }
                if let Some(user) = argument(line, "!impersonate ") {
                    return Command::Impersonate(user.to_string());
                }
            }
            SecurityMode::Plain | SecurityMode::Hashed => {}
        }

        Command::Send(line.to_string())
    }
}

/// The single word following `prefix`, if the line is exactly `prefix<word>`.
fn argument<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let arg = line.strip_prefix(prefix)?;
    (!arg.is_empty() && arg.chars().all(is_word_char)).then_some(arg)
}
