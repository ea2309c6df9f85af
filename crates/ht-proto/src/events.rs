//! Event payloads exchanged with the broadcast hub.

use serde::{Deserialize, Deserializer, Serialize};

/// The `message` payload, shared by both directions.
///
/// `hash` carries a hex SHA-256 digest and `signature` a base64 signature,
/// depending on the sender's mode. Empty strings are read as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub username: String,
    pub message: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub hash: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub signature: Option<String>,
}

impl WireMessage {
    /// A message with no security metadata.
    pub fn plain(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            hash: None,
            signature: None,
        }
    }
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// A `(username, publicKey)` binding as announced by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    pub username: String,
    pub public_key: String,
}

/// Events a client sends to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    RegisterPublicKey(KeyRecord),
    Message(WireMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterPublicKey(_) => "registerPublicKey",
            Self::Message(_) => "message",
        }
    }
}

/// Events the hub delivers to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Bulk directory seed, sent once after connecting.
    Init(Vec<(String, String)>),
    /// A single registration or key rotation.
    NewUser(KeyRecord),
    Message(WireMessage),
    Disconnect,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::NewUser(_) => "newUser",
            Self::Message(_) => "message",
            Self::Disconnect => "disconnect",
        }
    }
}
