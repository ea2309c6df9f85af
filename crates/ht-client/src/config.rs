//! Configuration management for ht-client
//!
//! Configuration is stored in TOML format and layered: built-in defaults,
//! then the config file, then command-line flags.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/hubtrust/client.toml`
//! - Windows: `%APPDATA%\hubtrust\client.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ht_core::{KeyParams, RevertPolicy, SessionConfig};
use ht_crypto::envelope::SecurityMode;
use ht_crypto::keys::{KeyEncoding, DEFAULT_KEY_BITS, MAX_KEY_BITS, MIN_KEY_BITS};
use ht_proto::validation::validate_username;

use crate::output::OutputFormat;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Client configuration
///
/// # Example TOML
///
/// ```toml
/// [hub]
/// addr = "127.0.0.1:3000"
///
/// [identity]
/// username = "alice"          # omit to be prompted
/// key_bits = 2048
/// key_encoding = "spki"       # "spki" | "pkcs1"; default follows the mode
/// revert_policy = "regenerate" # "regenerate" | "retain-original"
///
/// [session]
/// mode = "signed"             # "plain" | "hashed" | "encrypted" | "signed"
///
/// [output]
/// format = "text"             # "text" | "json"
/// show_fingerprints = true
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub address as `host:port`
    #[serde(default = "default_hub_addr")]
    pub addr: String,
}

fn default_hub_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            addr: default_hub_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Username to register; prompted for when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// RSA modulus size
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,

    /// PEM form of the announced key: "spki" or "pkcs1". When unset,
    /// encrypted sessions announce PKCS#1 and every other mode SPKI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_encoding: Option<String>,

    /// Keys after `!exit`: "regenerate" or "retain-original"
    #[serde(default = "default_revert_policy")]
    pub revert_policy: String,
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn default_revert_policy() -> String {
    RevertPolicy::default().to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            username: None,
            key_bits: default_key_bits(),
            key_encoding: None,
            revert_policy: default_revert_policy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Security mode: "plain", "hashed", "encrypted", "signed"
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    SecurityMode::Signed.to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "text" or "json"
    #[serde(default = "default_format")]
    pub format: String,

    /// Include key fingerprints in key-change warnings
    #[serde(default = "default_show_fingerprints")]
    pub show_fingerprints: bool,
}

fn default_format() -> String {
    OutputFormat::default().to_string()
}

fn default_show_fingerprints() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            show_fingerprints: default_show_fingerprints(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        match custom_path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    /// Platform-specific default path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "hubtrust")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                Self::default().save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.addr.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "hub.addr must not be empty".to_string(),
            ));
        }

        if let Some(name) = &self.identity.username {
            validate_username(name).map_err(|e| {
                ConfigError::ValidationError(format!("Invalid username '{name}': {e}"))
            })?;
        }

        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&self.identity.key_bits) {
            return Err(ConfigError::ValidationError(format!(
                "key_bits must be between {MIN_KEY_BITS} and {MAX_KEY_BITS}, got {}",
                self.identity.key_bits
            )));
        }

        if let Some(encoding) = &self.identity.key_encoding {
            encoding
                .parse::<KeyEncoding>()
                .map_err(ConfigError::ValidationError)?;
        }
        self.identity
            .revert_policy
            .parse::<RevertPolicy>()
            .map_err(ConfigError::ValidationError)?;
        self.session
            .mode
            .parse::<SecurityMode>()
            .map_err(ConfigError::ValidationError)?;
        self.output
            .format
            .parse::<OutputFormat>()
            .map_err(ConfigError::ValidationError)?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Session parameters from the `[identity]` and `[session]` sections.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mode: SecurityMode = self
            .session
            .mode
            .parse()
            .map_err(ConfigError::ValidationError)?;
        let encoding = match &self.identity.key_encoding {
            Some(encoding) => encoding.parse().map_err(ConfigError::ValidationError)?,
            None if mode == SecurityMode::Encrypted => KeyEncoding::Pkcs1,
            None => KeyEncoding::Spki,
        };
        Ok(SessionConfig {
            mode,
            key_params: KeyParams {
                bits: self.identity.key_bits,
                encoding,
            },
            revert_policy: self
                .identity
                .revert_policy
                .parse()
                .map_err(ConfigError::ValidationError)?,
        })
    }

    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        self.output
            .format
            .parse()
            .map_err(ConfigError::ValidationError)
    }
}

/// CLI overrides for configuration values
///
/// Each `Some` replaces the corresponding file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub hub_addr: Option<String>,
    pub username: Option<String>,
    pub mode: Option<String>,
    pub key_bits: Option<usize>,
    pub key_encoding: Option<String>,
    pub revert_policy: Option<String>,
    pub output_format: Option<String>,
    pub debug: Option<bool>,
}

impl Config {
    /// Apply CLI overrides to configuration
    ///
    /// CLI arguments take precedence over config file values.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref addr) = overrides.hub_addr {
            self.hub.addr = addr.clone();
        }
        if let Some(ref username) = overrides.username {
            self.identity.username = Some(username.clone());
        }
        if let Some(ref mode) = overrides.mode {
            self.session.mode = mode.clone();
        }
        if let Some(bits) = overrides.key_bits {
            self.identity.key_bits = bits;
        }
        if let Some(ref encoding) = overrides.key_encoding {
            self.identity.key_encoding = Some(encoding.clone());
        }
        if let Some(ref policy) = overrides.revert_policy {
            self.identity.revert_policy = policy.clone();
        }
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if let Some(true) = overrides.debug {
            self.logging.level = "debug".to_string();
        }
        self
    }
}
