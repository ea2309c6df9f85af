//! hubtrust client - interactive chat over an untrusted hub
//!
//! This crate provides:
//! - Configuration and command-line handling
//! - A line-delimited JSON transport to the hub
//! - The chat loop feeding stdin and hub events through the session
//! - Text and JSON rendering of what the session displays

pub mod chat;
pub mod cli;
pub mod config;
pub mod output;
pub mod transport;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{OutputFormat, Renderer};

/// Exit codes for the client process
///
/// - 0: Success - session ended normally
/// - 1: General error - unspecified error occurred
/// - 4: Connection failed - could not reach the hub, or lost it mid-session
/// - 5: Invalid input - bad arguments, username or configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Session ended normally (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Connection failed (exit code 4)
    ConnectionFailed = 4,
    /// Invalid input provided (exit code 5)
    InvalidInput = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Session ended normally",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::ConnectionFailed => "Could not reach the hub",
            ExitCode::InvalidInput => "Invalid arguments, username or configuration",
        }
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::ConnectionFailed as i32, 4);
        assert_eq!(ExitCode::InvalidInput as i32, 5);
        assert_eq!(i32::from(ExitCode::InvalidInput), 5);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::Success.name(), "SUCCESS");
        assert_eq!(ExitCode::ConnectionFailed.name(), "CONNECTION_FAILED");
        assert!(!ExitCode::GeneralError.description().is_empty());
    }
}
