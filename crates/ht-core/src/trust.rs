//! Trust evaluation of inbound chat lines.
//!
//! The hub is untrusted, so every inbound message gets a [`Verdict`] from the
//! checks its envelope mode supports. Anomalies are attached to what is
//! displayed; nothing is dropped because a check failed.

use std::fmt;

use ht_crypto::envelope::{
    unwrap_encrypted, unwrap_hashed, unwrap_plain, unwrap_signed, DecryptFailure, DigestFailure,
    Envelope, SecurityMode, SignatureFailure,
};
use ht_crypto::keys::{KeyMaterial, LocalKeyPair};
use tracing::{debug, warn};

use crate::directory::{KeyChanged, KeyDirectory};

/// A trust failure observed on inbound data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Anomaly {
    HashMismatch,
    NoDigest,
    InvalidSignature,
    NoSignature,
    UnknownSender,
    KeyChanged,
}

impl Anomaly {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Anomaly::HashMismatch => "hash_mismatch",
            Anomaly::NoDigest => "no_digest",
            Anomaly::InvalidSignature => "invalid_signature",
            Anomaly::NoSignature => "no_signature",
            Anomaly::UnknownSender => "unknown_sender",
            Anomaly::KeyChanged => "key_changed",
        }
    }

    /// Human-readable warning line.
    pub fn warning_text(&self) -> &'static str {
        match self {
            Anomaly::HashMismatch => {
                "[WARNING] message may have been altered in transit (hash mismatch)"
            }
            Anomaly::NoDigest => "[WARNING] message may have been altered in transit (no hash)",
            Anomaly::InvalidSignature => "[WARNING] sender may be fake (signature invalid)",
            Anomaly::NoSignature => "[WARNING] sender may be fake (no signature)",
            Anomaly::UnknownSender => "[WARNING] sender may be fake (no public key known)",
            Anomaly::KeyChanged => "[WARNING] sender may be fake (public key changed)",
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DigestFailure> for Anomaly {
    fn from(failure: DigestFailure) -> Self {
        match failure {
            DigestFailure::Missing => Anomaly::NoDigest,
            DigestFailure::Mismatch => Anomaly::HashMismatch,
        }
    }
}

impl From<SignatureFailure> for Anomaly {
    fn from(failure: SignatureFailure) -> Self {
        match failure {
            SignatureFailure::UnknownSender => Anomaly::UnknownSender,
            SignatureFailure::Missing => Anomaly::NoSignature,
            SignatureFailure::Malformed
            | SignatureFailure::UnusableKey
            | SignatureFailure::Invalid => Anomaly::InvalidSignature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every check the mode supports passed. Plain messages, and cleartext
    /// seen in an encrypted session, are trusted because they make no claim.
    Trusted,
    /// Encrypted to someone else. Shown as the raw ciphertext, not a warning.
    Opaque,
    Warning(Anomaly),
}

impl Verdict {
    pub fn anomaly(&self) -> Option<Anomaly> {
        match self {
            Verdict::Warning(a) => Some(*a),
            Verdict::Trusted | Verdict::Opaque => None,
        }
    }
}

/// A displayable inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub sender: String,
    pub text: String,
    pub verdict: Verdict,
}

/// Evaluates inbound envelopes against the key directory for one local identity.
pub struct TrustEvaluator<'a> {
    directory: &'a KeyDirectory,
    local_username: &'a str,
    local_keys: &'a LocalKeyPair,
}

impl<'a> TrustEvaluator<'a> {
    pub fn new(
        directory: &'a KeyDirectory,
        local_username: &'a str,
        local_keys: &'a LocalKeyPair,
    ) -> Self {
        Self {
            directory,
            local_username,
            local_keys,
        }
    }

    /// Evaluate one inbound envelope.
    ///
    /// Returns `None` for our own messages echoed back by the hub.
    pub fn evaluate(&self, env: &Envelope) -> Option<Evaluation> {
        if env.sender() == self.local_username {
            return None;
        }

        let (text, verdict) = match env.mode() {
            SecurityMode::Plain => (unwrap_plain(env).to_string(), Verdict::Trusted),
            SecurityMode::Hashed => match unwrap_hashed(env) {
                Ok(text) => (text.to_string(), Verdict::Trusted),
                Err(failure) => (env.payload().to_string(), Verdict::Warning(failure.into())),
            },
            SecurityMode::Encrypted => match unwrap_encrypted(env, self.local_keys) {
                Ok(text) => (text, Verdict::Trusted),
                Err(DecryptFailure::NotBase64) => {
                    debug!(sender = %env.sender(), "cleartext message");
                    (env.payload().to_string(), Verdict::Trusted)
                }
                Err(failure) => {
                    debug!(sender = %env.sender(), ?failure, "ciphertext not for us");
                    (env.payload().to_string(), Verdict::Opaque)
                }
            },
            SecurityMode::Signed => {
                match unwrap_signed(env, self.directory.lookup(env.sender())) {
                    Ok(text) => (text.to_string(), Verdict::Trusted),
                    Err(failure) => {
                        debug!(sender = %env.sender(), ?failure, "signature check failed");
                        (env.payload().to_string(), Verdict::Warning(failure.into()))
                    }
                }
            }
        };

        Some(Evaluation {
            sender: env.sender().to_string(),
            text,
            verdict,
        })
    }

    /// Apply an announced registration to the directory.
    ///
    /// Returns the key change once per rebind; the caller renders it as a
    /// standing `Warning(KeyChanged)` for that username.
    pub fn on_registration(
        directory: &mut KeyDirectory,
        username: &str,
        key: KeyMaterial,
    ) -> Option<KeyChanged> {
        let change = directory.upsert(username, key)?;
        warn!(
            %username,
            previous = %change.previous.short_fingerprint(),
            current = %change.current.short_fingerprint(),
            "public key changed"
        );
        Some(change)
    }
}
