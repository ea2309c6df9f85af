//! Configuration management
//!
//! Values are layered, later sources winning: defaults, a TOML file
//! (`--config` or `HT_HUB_CONFIG`), `HT_HUB_*` environment variables, then
//! command-line flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ht_proto::MAX_LINE_BYTES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line flags for the hub
#[derive(Parser, Debug, Default)]
#[command(name = "ht-hub")]
#[command(version, about = "Broadcast hub for hubtrust chat clients")]
pub struct HubArgs {
    /// Address to listen on
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Longest accepted input line in bytes
    #[arg(long)]
    pub max_line_bytes: Option<usize>,

    /// Maximum simultaneous clients
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// TOML config file
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_line_bytes: usize,
    pub max_clients: usize,
    /// Lines buffered per client before further lines to it are dropped
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_line_bytes: MAX_LINE_BYTES,
            max_clients: 256,
            outbound_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Load configuration from all sources
    pub fn load(args: &HubArgs) -> Result<Self, ConfigError> {
        let file = args
            .config
            .clone()
            .or_else(|| std::env::var("HT_HUB_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_toml_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `HT_HUB_*` variables found through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("HT_HUB_LISTEN_ADDR") {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid HT_HUB_LISTEN_ADDR: {e}")))?;
        }
        if let Some(max) = lookup("HT_HUB_MAX_LINE_BYTES") {
            self.max_line_bytes = max
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid HT_HUB_MAX_LINE_BYTES: {e}")))?;
        }
        if let Some(max) = lookup("HT_HUB_MAX_CLIENTS") {
            self.max_clients = max
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid HT_HUB_MAX_CLIENTS: {e}")))?;
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &HubArgs) {
        if let Some(addr) = args.listen {
            self.listen_addr = addr;
        }
        if let Some(max) = args.max_line_bytes {
            self.max_line_bytes = max;
        }
        if let Some(max) = args.max_clients {
            self.max_clients = max;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be > 0".to_string()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue must be > 0".to_string()));
        }
        if !(1024..=MAX_LINE_BYTES).contains(&self.max_line_bytes) {
            return Err(ConfigError::Invalid(format!(
                "max_line_bytes must be between 1024 and {MAX_LINE_BYTES}"
            )));
        }
        Ok(())
    }
}
