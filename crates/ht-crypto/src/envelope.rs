//! Envelope codec: the four security wrappings of a chat line.
//!
//! Each mode gives exactly one guarantee and is never combined with another:
//!
//! | mode      | payload            | auxiliary          | guarantee        |
//! |-----------|--------------------|--------------------|------------------|
//! | Plain     | plaintext          | none               | none             |
//! | Hashed    | plaintext          | hex SHA-256        | integrity        |
//! | Encrypted | base64 RSA-OAEP    | none               | confidentiality  |
//! | Signed    | plaintext          | base64 PKCS#1 sig  | authenticity     |
//!
//! Inbound failures are returned as typed outcomes and never panic: the hub
//! broadcasts everything to everyone, so a ciphertext we cannot open is the
//! normal case, not an exceptional one.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::hash::{sha256, sha256_hex};
use crate::keys::{KeyMaterial, LocalKeyPair};
use crate::utils::constant_time_str_eq;
use ht_proto::WireMessage;

/// OAEP overhead with SHA-256: two hash lengths plus two bytes.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    #[default]
    Plain,
    Hashed,
    Encrypted,
    Signed,
}

impl SecurityMode {
    pub const ALL: [SecurityMode; 4] = [Self::Plain, Self::Hashed, Self::Encrypted, Self::Signed];
}

impl FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "hashed" | "hash" => Ok(Self::Hashed),
            "encrypted" | "encryption" => Ok(Self::Encrypted),
            "signed" | "signature" => Ok(Self::Signed),
            _ => Err(format!("Unknown security mode: {s}")),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Hashed => write!(f, "hashed"),
            Self::Encrypted => write!(f, "encrypted"),
            Self::Signed => write!(f, "signed"),
        }
    }
}

/// Errors producing an outgoing envelope.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("message is {len} bytes, the recipient key fits at most {max}")]
    PlaintextTooLong { len: usize, max: usize },
    #[error("recipient public key is not a usable RSA key")]
    InvalidRecipientKey,
    #[error("encryption failed: {0}")]
    Encrypt(#[source] rsa::Error),
    #[error("signing failed: {0}")]
    Sign(#[source] rsa::Error),
}

/// Why a hashed envelope did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DigestFailure {
    #[error("no digest present")]
    Missing,
    #[error("digest does not match message")]
    Mismatch,
}

/// Why an encrypted envelope could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecryptFailure {
    #[error("payload is not base64")]
    NotBase64,
    #[error("ciphertext is not addressed to this key")]
    NotAddressedToUs,
    #[error("decrypted bytes are not UTF-8")]
    NotUtf8,
}

/// Why a signed envelope did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureFailure {
    #[error("no public key known for sender")]
    UnknownSender,
    #[error("no signature present")]
    Missing,
    #[error("signature is not base64")]
    Malformed,
    #[error("sender public key is not a usable RSA key")]
    UnusableKey,
    #[error("signature verification failed")]
    Invalid,
}

/// A chat line with its security metadata. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: String,
    payload: String,
    mode: SecurityMode,
    auxiliary: Option<String>,
}

impl Envelope {
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Plaintext, or base64 ciphertext in encrypted mode.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Hex digest (hashed) or base64 signature (signed).
    pub fn auxiliary(&self) -> Option<&str> {
        self.auxiliary.as_deref()
    }

    /// Convert to the `message` event payload.
    pub fn to_wire(&self) -> WireMessage {
        let mut wire = WireMessage::plain(self.sender.clone(), self.payload.clone());
        match self.mode {
            SecurityMode::Hashed => wire.hash = self.auxiliary.clone(),
            SecurityMode::Signed => wire.signature = self.auxiliary.clone(),
            SecurityMode::Plain | SecurityMode::Encrypted => {}
        }
        wire
    }

    /// Read a `message` payload as an envelope of `mode`.
    ///
    /// The wire carries no mode tag; the receiver's own mode decides which
    /// optional field is the auxiliary. Fields that do not belong to `mode`
    /// are ignored.
    pub fn from_wire(wire: WireMessage, mode: SecurityMode) -> Self {
        let auxiliary = match mode {
            SecurityMode::Hashed => wire.hash,
            SecurityMode::Signed => wire.signature,
            SecurityMode::Plain | SecurityMode::Encrypted => None,
        };
        Self {
            sender: wire.username,
            payload: wire.message,
            mode,
            auxiliary,
        }
    }
}

// ============================================================================
// Plain
// ============================================================================

pub fn wrap_plain(sender: &str, plaintext: &str) -> Envelope {
    Envelope {
        sender: sender.to_string(),
        payload: plaintext.to_string(),
        mode: SecurityMode::Plain,
        auxiliary: None,
    }
}

pub fn unwrap_plain(env: &Envelope) -> &str {
    &env.payload
}

// ============================================================================
// Hashed
// ============================================================================

/// Attach the SHA-256 digest of `plaintext`. The message still travels in clear.
pub fn wrap_hashed(sender: &str, plaintext: &str) -> Envelope {
    Envelope {
        sender: sender.to_string(),
        payload: plaintext.to_string(),
        mode: SecurityMode::Hashed,
        auxiliary: Some(sha256_hex(plaintext)),
    }
}

/// Recompute the digest over the received payload and compare it to the carried one.
pub fn unwrap_hashed(env: &Envelope) -> Result<&str, DigestFailure> {
    let carried = env.auxiliary.as_deref().ok_or(DigestFailure::Missing)?;
    let computed = sha256_hex(&env.payload);
    if constant_time_str_eq(&computed, carried) {
        Ok(&env.payload)
    } else {
        Err(DigestFailure::Mismatch)
    }
}

// ============================================================================
// Encrypted
// ============================================================================

/// Largest plaintext RSA-OAEP(SHA-256) can carry under `key`.
pub fn max_plaintext_len(key: &rsa::RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_SHA256_OVERHEAD)
}

/// Encrypt raw bytes to `recipient` with RSA-OAEP, SHA-256 for both hash and MGF1.
pub fn encrypt_to(plaintext: &[u8], recipient: &KeyMaterial) -> Result<Vec<u8>, CodecError> {
    let key = recipient.to_rsa().map_err(|_| CodecError::InvalidRecipientKey)?;
    let max = max_plaintext_len(&key);
    if plaintext.len() > max {
        return Err(CodecError::PlaintextTooLong {
            len: plaintext.len(),
            max,
        });
    }
    key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(CodecError::Encrypt)
}

/// Decrypt raw bytes with the local private key.
pub fn decrypt_with(ciphertext: &[u8], local: &LocalKeyPair) -> Result<Vec<u8>, DecryptFailure> {
    local
        .private_key()
        .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), ciphertext)
        .map_err(|_| DecryptFailure::NotAddressedToUs)
}

/// Encrypt `plaintext` to the conversation target's public key.
pub fn wrap_encrypted(
    sender: &str,
    plaintext: &str,
    recipient: &KeyMaterial,
) -> Result<Envelope, CodecError> {
    let ciphertext = encrypt_to(plaintext.as_bytes(), recipient)?;
    Ok(Envelope {
        sender: sender.to_string(),
        payload: BASE64.encode(ciphertext),
        mode: SecurityMode::Encrypted,
        auxiliary: None,
    })
}

/// Try to open an encrypted envelope with our private key.
pub fn unwrap_encrypted(env: &Envelope, local: &LocalKeyPair) -> Result<String, DecryptFailure> {
    let ciphertext = BASE64
        .decode(env.payload.trim())
        .map_err(|_| DecryptFailure::NotBase64)?;
    let plaintext = Zeroizing::new(decrypt_with(&ciphertext, local)?);
    String::from_utf8(plaintext.to_vec()).map_err(|_| DecryptFailure::NotUtf8)
}

// ============================================================================
// Signed
// ============================================================================

/// RSASSA-PKCS1-v1_5 over SHA-256 of `message`.
pub fn sign_message(message: &[u8], signer: &LocalKeyPair) -> Result<Vec<u8>, CodecError> {
    let digest = sha256(message);
    signer
        .private_key()
        .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(CodecError::Sign)
}

pub fn verify_message(
    message: &[u8],
    signature: &[u8],
    key: &KeyMaterial,
) -> Result<(), SignatureFailure> {
    let key = key.to_rsa().map_err(|_| SignatureFailure::UnusableKey)?;
    let digest = sha256(message);
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| SignatureFailure::Invalid)
}

/// Sign `plaintext` with the local key; the message itself stays in clear.
pub fn wrap_signed(
    sender: &str,
    plaintext: &str,
    signer: &LocalKeyPair,
) -> Result<Envelope, CodecError> {
    let signature = sign_message(plaintext.as_bytes(), signer)?;
    Ok(Envelope {
        sender: sender.to_string(),
        payload: plaintext.to_string(),
        mode: SecurityMode::Signed,
        auxiliary: Some(BASE64.encode(signature)),
    })
}

/// Verify a signed envelope against the claimed sender's current key.
///
/// Checks run in order: sender key known, signature present, signature valid.
pub fn unwrap_signed<'a>(
    env: &'a Envelope,
    sender_key: Option<&KeyMaterial>,
) -> Result<&'a str, SignatureFailure> {
    let key = sender_key.ok_or(SignatureFailure::UnknownSender)?;
    let encoded = env.auxiliary.as_deref().ok_or(SignatureFailure::Missing)?;
    let signature = BASE64
        .decode(encoded.trim())
        .map_err(|_| SignatureFailure::Malformed)?;
    verify_message(env.payload.as_bytes(), &signature, key)?;
    Ok(&env.payload)
}
