//! Command-line arguments and the top-level client flow.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tracing::{error, info};

use ht_core::{CoreError, RevertPolicy, SessionController};
use ht_crypto::envelope::SecurityMode;
use ht_crypto::keys::KeyEncoding;
use ht_proto::validation::validate_username;

use crate::chat::{run_chat, ChatEnd};
use crate::config::{CliOverrides, Config};
use crate::output::{OutputFormat, Renderer};
use crate::transport::TcpTransport;
use crate::ExitCode;

/// hubtrust chat client
#[derive(Parser, Debug)]
#[command(name = "ht-client")]
#[command(version, about = "Chat through an untrusted hub with hashed, encrypted or signed messages")]
pub struct Cli {
    /// Hub address (host:port)
    #[arg(long, env = "HT_HUB")]
    pub hub: Option<String>,

    /// Username to register (prompted for when absent)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Security mode: plain, hashed, encrypted, signed
    #[arg(short, long)]
    pub mode: Option<SecurityMode>,

    /// RSA key size in bits
    #[arg(long)]
    pub key_bits: Option<usize>,

    /// PEM form of the announced public key: spki, pkcs1
    #[arg(long)]
    pub key_encoding: Option<KeyEncoding>,

    /// Keys after `!exit` in signed mode: regenerate, retain-original
    #[arg(long)]
    pub revert_policy: Option<RevertPolicy>,

    /// Output format: text, json
    #[arg(long)]
    pub output: Option<OutputFormat>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Debug logging (protocol-level tracing)
    #[arg(long)]
    pub debug: bool,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            hub_addr: self.hub.clone(),
            username: self.username.clone(),
            mode: self.mode.map(|m| m.to_string()),
            key_bits: self.key_bits,
            key_encoding: self.key_encoding.map(|e| e.to_string()),
            revert_policy: self.revert_policy.map(|p| p.to_string()),
            output_format: self.output.map(|f| f.to_string()),
            debug: self.debug.then_some(true),
        }
    }

    /// Run a chat session with a resolved configuration.
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        if let Err(e) = config.validate() {
            eprintln!("Error: {e}");
            return Ok(ExitCode::InvalidInput);
        }
        let session_config = config.session_config()?;
        let renderer = Renderer::new(config.output_format()?, config.output.show_fingerprints);

        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        let username = match config.identity.username.clone() {
            Some(name) => name,
            None => match prompt_username(&mut input, &mut stdout).await? {
                Some(name) => name,
                None => return Ok(ExitCode::InvalidInput),
            },
        };

        let mut session = match SessionController::new(&username, session_config) {
            Ok(session) => session,
            Err(CoreError::Username(e)) => {
                eprintln!("Error: invalid username '{username}': {e}");
                return Ok(ExitCode::InvalidInput);
            }
            Err(e) => return Err(e).context("failed to set up identity"),
        };

        let mut transport = match TcpTransport::connect(&config.hub.addr).await {
            Ok(transport) => transport,
            Err(e) => {
                error!(addr = %config.hub.addr, error = %e, "could not reach hub");
                eprintln!("Error: could not connect to hub at {}: {e}", config.hub.addr);
                return Ok(ExitCode::ConnectionFailed);
            }
        };
        info!(addr = %config.hub.addr, mode = %session.mode(), %username, "joined hub");

        let shutdown = async {
            // If the handler cannot be installed, run until input or hub ends.
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let summary = run_chat(
            &mut session,
            &mut transport,
            &mut input,
            &mut stdout,
            renderer,
            shutdown,
        )
        .await
        .context("chat session failed")?;

        Ok(match summary.end {
            ChatEnd::HubDisconnected => ExitCode::ConnectionFailed,
            ChatEnd::InputClosed | ChatEnd::Interrupted => ExitCode::Success,
        })
    }
}

/// Ask for a username on stdout until a valid one is given.
///
/// Returns `None` if input ends first.
async fn prompt_username<I, O>(
    input: &mut Lines<I>,
    out: &mut O,
) -> std::io::Result<Option<String>>
where
    I: AsyncBufRead + Unpin,
    O: tokio::io::AsyncWrite + Unpin,
{
    loop {
        out.write_all(b"Enter your username: ").await?;
        out.flush().await?;

        let Some(line) = input.next_line().await? else {
            return Ok(None);
        };
        let name = line.trim();
        match validate_username(name) {
            Ok(()) => return Ok(Some(name.to_string())),
            Err(e) => {
                out.write_all(format!("Invalid username: {e}\n").as_bytes())
                    .await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "ht-client",
            "--hub",
            "10.0.0.2:3000",
            "-u",
            "alice",
            "--mode",
            "encryption",
            "--revert-policy",
            "retain-original",
            "--output",
            "json",
            "--debug",
        ])
        .unwrap();

        assert_eq!(cli.mode, Some(SecurityMode::Encrypted));
        let overrides = cli.overrides();
        assert_eq!(overrides.hub_addr.as_deref(), Some("10.0.0.2:3000"));
        assert_eq!(overrides.username.as_deref(), Some("alice"));
        assert_eq!(overrides.mode.as_deref(), Some("encrypted"));
        assert_eq!(overrides.revert_policy.as_deref(), Some("retain-original"));
        assert_eq!(overrides.output_format.as_deref(), Some("json"));
        assert_eq!(overrides.debug, Some(true));
        assert!(overrides.key_bits.is_none());
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["ht-client", "--mode", "rot13"]).is_err());
    }

    #[tokio::test]
    async fn test_prompt_retries_until_valid() {
        let script: &[u8] = b"two words\n  carol  \n";
        let mut input = BufReader::new(script).lines();
        let mut out = Vec::new();

        let name = prompt_username(&mut input, &mut out).await.unwrap();
        assert_eq!(name.as_deref(), Some("carol"));

        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("Enter your username: ").count(), 2);
        assert!(shown.contains("Invalid username"));
    }

    #[tokio::test]
    async fn test_prompt_eof() {
        let script: &[u8] = b"";
        let mut input = BufReader::new(script).lines();
        let mut out = Vec::new();
        assert!(prompt_username(&mut input, &mut out).await.unwrap().is_none());
    }
}
