//! RSA key material for chat identities.
//!
//! Public keys travel as PEM text next to chat content, so everything here
//! treats a received key as untrusted text: a [`KeyMaterial`] can always be
//! built from whatever a peer announced, and only fails once it is used.

use std::fmt;
use std::str::FromStr;

use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::hash::sha256;
use crate::utils::constant_time_compare;

/// Modulus size used when nothing else is configured.
pub const DEFAULT_KEY_BITS: usize = 2048;
pub const MIN_KEY_BITS: usize = 1024;
pub const MAX_KEY_BITS: usize = 4096;

/// Error type for key operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unsupported key size {0} bits (allowed: {MIN_KEY_BITS}..={MAX_KEY_BITS})")]
    UnsupportedSize(usize),
    #[error("key generation failed: {0}")]
    Generation(#[source] rsa::Error),
    #[error("PEM encoding failed: {0}")]
    Encoding(String),
    #[error("not an RSA public key in SPKI or PKCS#1 PEM form")]
    InvalidPublicKey,
}

/// PEM flavour used when announcing our own public key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyEncoding {
    /// `-----BEGIN PUBLIC KEY-----`
    #[default]
    Spki,
    /// `-----BEGIN RSA PUBLIC KEY-----`
    Pkcs1,
}

impl FromStr for KeyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spki" => Ok(Self::Spki),
            "pkcs1" => Ok(Self::Pkcs1),
            _ => Err(format!("Unknown key encoding: {s}")),
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spki => write!(f, "spki"),
            Self::Pkcs1 => write!(f, "pkcs1"),
        }
    }
}

/// A public key as announced on the wire.
///
/// Equality is by fingerprint: SHA-256 of the SPKI DER when the PEM parses,
/// so the same key in PKCS#1 and SPKI form compares equal. Unparseable text
/// is fingerprinted as-is.
#[derive(Clone)]
pub struct KeyMaterial {
    pem: String,
    fingerprint: [u8; 32],
}

impl KeyMaterial {
    /// Wrap PEM text received from a peer. Never fails.
    pub fn from_pem(pem: impl Into<String>) -> Self {
        let pem = pem.into();
        let fingerprint = match parse_public_pem(&pem) {
            Some(key) => match key.to_public_key_der() {
                Ok(der) => sha256(der.as_bytes()),
                Err(_) => sha256(pem.trim().as_bytes()),
            },
            None => sha256(pem.trim().as_bytes()),
        };
        Self { pem, fingerprint }
    }

    /// Encode a parsed public key.
    pub fn from_public_key(key: &RsaPublicKey, encoding: KeyEncoding) -> Result<Self, KeyError> {
        let pem = match encoding {
            KeyEncoding::Spki => key
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| KeyError::Encoding(e.to_string()))?,
            KeyEncoding::Pkcs1 => key
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| KeyError::Encoding(e.to_string()))?,
        };
        Ok(Self::from_pem(pem))
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    /// First 8 fingerprint bytes in hex, for logs and warnings.
    pub fn short_fingerprint(&self) -> String {
        hex::encode(&self.fingerprint[..8])
    }

    /// Parse into an RSA public key.
    pub fn to_rsa(&self) -> Result<RsaPublicKey, KeyError> {
        parse_public_pem(&self.pem).ok_or(KeyError::InvalidPublicKey)
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        constant_time_compare(&self.fingerprint, &other.fingerprint)
    }
}

impl Eq for KeyMaterial {}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.short_fingerprint())
            .finish()
    }
}

fn parse_public_pem(pem: &str) -> Option<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .ok()
}

/// The local identity's keypair. The private half never leaves this struct.
pub struct LocalKeyPair {
    private: RsaPrivateKey,
    public: KeyMaterial,
}

impl LocalKeyPair {
    /// Generate a fresh keypair from the OS random source.
    pub fn generate(bits: usize, encoding: KeyEncoding) -> Result<Self, KeyError> {
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) {
            return Err(KeyError::UnsupportedSize(bits));
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits).map_err(KeyError::Generation)?;
        Self::from_private_key(private, encoding)
    }

    pub fn from_private_key(private: RsaPrivateKey, encoding: KeyEncoding) -> Result<Self, KeyError> {
        let public = KeyMaterial::from_public_key(&private.to_public_key(), encoding)?;
        Ok(Self { private, public })
    }

    /// The announced public key.
    pub fn public(&self) -> &KeyMaterial {
        &self.public
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.private.size() * 8
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }
}

impl fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("bits", &self.bits())
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_generated_key_pem_forms() {
        assert!(fixtures::alice().public().pem().starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(fixtures::bob().public().pem().starts_with("-----BEGIN RSA PUBLIC KEY-----"));
        assert_eq!(fixtures::alice().bits(), fixtures::TEST_BITS);
    }

    #[test]
    fn test_pkcs1_and_spki_of_same_key_are_equal() {
        let rsa = fixtures::alice().public().to_rsa().unwrap();
        let spki = KeyMaterial::from_public_key(&rsa, KeyEncoding::Spki).unwrap();
        let pkcs1 = KeyMaterial::from_public_key(&rsa, KeyEncoding::Pkcs1).unwrap();
        assert_ne!(spki.pem(), pkcs1.pem());
        assert_eq!(spki, pkcs1);
    }

    #[test]
    fn test_distinct_keys_differ() {
        assert_ne!(fixtures::alice().public(), fixtures::eve().public());
    }

    #[test]
    fn test_trailing_whitespace_ignored() {
        let pem = fixtures::alice().public().pem();
        let padded = KeyMaterial::from_pem(format!("\n{pem}\n\n"));
        assert_eq!(&padded, fixtures::alice().public());
        assert!(padded.to_rsa().is_ok());
    }

    #[test]
    fn test_garbage_key_is_stored_but_unusable() {
        let junk = KeyMaterial::from_pem("not a key");
        assert!(matches!(junk.to_rsa(), Err(KeyError::InvalidPublicKey)));
        assert_eq!(junk, KeyMaterial::from_pem("  not a key  "));
        assert_ne!(junk, KeyMaterial::from_pem("another"));
    }

    #[test]
    fn test_rejects_unsupported_size() {
        assert!(matches!(
            LocalKeyPair::generate(512, KeyEncoding::Spki),
            Err(KeyError::UnsupportedSize(512))
        ));
    }

    #[test]
    fn test_key_encoding_parse() {
        assert_eq!("SPKI".parse::<KeyEncoding>().unwrap(), KeyEncoding::Spki);
        assert_eq!("pkcs1".parse::<KeyEncoding>().unwrap(), KeyEncoding::Pkcs1);
        assert!("pem".parse::<KeyEncoding>().is_err());
        assert_eq!(KeyEncoding::Pkcs1.to_string(), "pkcs1");
    }

    #[test]
    fn test_debug_hides_private_key() {
        let dbg = format!("{:?}", fixtures::alice());
        assert!(dbg.contains("fingerprint"));
        assert!(!dbg.contains("BEGIN"));
    }
}
