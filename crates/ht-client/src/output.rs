//! Rendering of session notices.
//!
//! Text output goes to stdout one notice per line (warnings on their own
//! line above the message). JSON output is one object per notice for scripts.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use ht_core::{Anomaly, Notice, Verdict};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// One notice as a JSON object.
#[derive(Debug, Serialize)]
pub struct JsonNotice<'a> {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl<'a> JsonNotice<'a> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            username: None,
            text: None,
            verdict: None,
            anomaly: None,
            warning: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn with_anomaly(mut self, anomaly: Anomaly) -> Self {
        self.anomaly = Some(anomaly.as_str());
        self.warning = Some(anomaly.warning_text());
        self
    }

    pub fn from_notice(notice: &'a Notice) -> Self {
        match notice {
            Notice::Welcome { username } => Self {
                username: Some(username),
                ..Self::new("welcome")
            },
            Notice::Roster { count } => Self {
                text: Some(count.to_string()),
                ..Self::new("roster")
            },
            Notice::Joined { username } => Self {
                username: Some(username),
                ..Self::new("joined")
            },
            Notice::KeyChanged(change) => Self {
                username: Some(&change.username),
                text: Some(format!(
                    "{} -> {}",
                    change.previous.short_fingerprint(),
                    change.current.short_fingerprint()
                )),
                ..Self::new("key_changed")
            }
            .with_anomaly(Anomaly::KeyChanged),
            Notice::Chat(eval) => {
                let json = Self {
                    username: Some(&eval.sender),
                    text: Some(eval.text.clone()),
                    verdict: Some(verdict_name(eval.verdict)),
                    ..Self::new("chat")
                };
                match eval.verdict.anomaly() {
                    Some(anomaly) => json.with_anomaly(anomaly),
                    None => json,
                }
            }
            Notice::SecretStarted { target, .. } => Self {
                username: Some(target),
                ..Self::new("secret_started")
            },
            Notice::SecretEnded { target } => Self {
                username: Some(target),
                ..Self::new("secret_ended")
            },
            Notice::Impersonating { username } => Self {
                username: Some(username),
                ..Self::new("impersonating")
            },
            Notice::Reverted { username } => Self {
                username: Some(username),
                ..Self::new("reverted")
            },
            Notice::Error(msg) => Self {
                text: Some(msg.clone()),
                ..Self::new("error")
            },
            Notice::Disconnected => Self::new("disconnected"),
        }
    }
}

fn verdict_name(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Trusted => "trusted",
        Verdict::Opaque => "opaque",
        Verdict::Warning(_) => "warning",
    }
}

/// Turns notices into output lines.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    format: OutputFormat,
    show_fingerprints: bool,
}

impl Renderer {
    pub fn new(format: OutputFormat, show_fingerprints: bool) -> Self {
        Self {
            format,
            show_fingerprints,
        }
    }

    /// Render one notice, without a trailing newline.
    pub fn render(&self, notice: &Notice) -> String {
        match self.format {
            OutputFormat::Text => match notice {
                Notice::KeyChanged(change) if !self.show_fingerprints => format!(
                    "{} for {}",
                    Anomaly::KeyChanged.warning_text(),
                    change.username
                ),
                _ => notice.to_string(),
            },
            OutputFormat::Json => {
                let json = JsonNotice::from_notice(notice);
                serde_json::to_string(&json).unwrap_or_else(|e| {
                    format!(r#"{{"kind":"error","text":"failed to serialize notice: {e}"}}"#)
                })
            }
        }
    }
}
