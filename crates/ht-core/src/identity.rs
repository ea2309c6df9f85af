//! Local identity: the username we post as and the keypair bound to it.
//!
//! ```text
//! Registered(name) --impersonate(t)--> Impersonating(name, t)
//! Impersonating(name, t) --impersonate(u)--> Impersonating(name, u)
//! Impersonating(name, _) --revert--> Registered(name)
//! ```
//!
//! Every transition that changes the active name or keypair yields a
//! [`Registration`] the caller must announce, so the hub's roster always
//! reflects the key that signs our outgoing lines.

use std::fmt;
use std::str::FromStr;

use ht_crypto::keys::{KeyEncoding, KeyError, KeyMaterial, LocalKeyPair, DEFAULT_KEY_BITS};
use ht_proto::{ClientEvent, KeyRecord};
use tracing::{debug, info};

/// How a revert restores the registered identity's keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevertPolicy {
    /// Generate a fresh keypair on revert. Peers that had the old key see a
    /// key change for the registered name.
    #[default]
    Regenerate,
    /// Keep the original keypair across impersonation and re-announce it.
    RetainOriginal,
}

impl FromStr for RevertPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "regenerate" => Ok(Self::Regenerate),
            "retain-original" | "retain" => Ok(Self::RetainOriginal),
            _ => Err(format!("Unknown revert policy: {s}")),
        }
    }
}

impl fmt::Display for RevertPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regenerate => write!(f, "regenerate"),
            Self::RetainOriginal => write!(f, "retain-original"),
        }
    }
}

/// Parameters for every keypair this identity generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParams {
    pub bits: usize,
    pub encoding: KeyEncoding,
}

impl Default for KeyParams {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
            encoding: KeyEncoding::default(),
        }
    }
}

impl KeyParams {
    pub fn generate(&self) -> Result<LocalKeyPair, KeyError> {
        LocalKeyPair::generate(self.bits, self.encoding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    Registered { name: String },
    Impersonating { registered: String, active: String },
}

/// A (username, public key) binding to announce to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub public_key: KeyMaterial,
}

impl Registration {
    pub fn to_event(&self) -> ClientEvent {
        ClientEvent::RegisterPublicKey(KeyRecord {
            username: self.username.clone(),
            public_key: self.public_key.pem().to_string(),
        })
    }
}

pub struct IdentityContext {
    state: IdentityState,
    keys: LocalKeyPair,
    /// The registered identity's keypair while impersonating under `RetainOriginal`.
    retained: Option<LocalKeyPair>,
    params: KeyParams,
    policy: RevertPolicy,
}

impl IdentityContext {
    /// Create the registered identity with a freshly generated keypair.
    pub fn new(
        username: impl Into<String>,
        params: KeyParams,
        policy: RevertPolicy,
    ) -> Result<Self, KeyError> {
        let keys = params.generate()?;
        Ok(Self::with_keys(username, keys, params, policy))
    }

    /// Create the registered identity around an existing keypair.
    pub fn with_keys(
        username: impl Into<String>,
        keys: LocalKeyPair,
        params: KeyParams,
        policy: RevertPolicy,
    ) -> Self {
        Self {
            state: IdentityState::Registered {
                name: username.into(),
            },
            keys,
            retained: None,
            params,
            policy,
        }
    }

    pub fn state(&self) -> &IdentityState {
        &self.state
    }

    /// The name outgoing messages are attributed to.
    pub fn active_username(&self) -> &str {
        match &self.state {
            IdentityState::Registered { name } => name,
            IdentityState::Impersonating { active, .. } => active,
        }
    }

    /// The name the session was started with.
    pub fn registered_username(&self) -> &str {
        match &self.state {
            IdentityState::Registered { name } => name,
            IdentityState::Impersonating { registered, .. } => registered,
        }
    }

    pub fn is_impersonating(&self) -> bool {
        matches!(self.state, IdentityState::Impersonating { .. })
    }

    /// The keypair bound to the active name.
    pub fn keys(&self) -> &LocalKeyPair {
        &self.keys
    }

    /// The binding currently in effect.
    pub fn registration(&self) -> Registration {
        Registration {
            username: self.active_username().to_string(),
            public_key: self.keys.public().clone(),
        }
    }

    /// Switch the active name to `target` under a freshly generated keypair.
    ///
    /// The key is generated before any state changes, so a failure leaves the
    /// identity untouched.
    pub fn impersonate(&mut self, target: &str) -> Result<Registration, KeyError> {
        let fresh = self.params.generate()?;
        let old = std::mem::replace(&mut self.keys, fresh);

        let registered = self.registered_username().to_string();
        if !self.is_impersonating() && self.policy == RevertPolicy::RetainOriginal {
            self.retained = Some(old);
        }

        info!(%registered, active = %target, "impersonating");
        self.state = IdentityState::Impersonating {
            registered,
            active: target.to_string(),
        };
        Ok(self.registration())
    }

    /// Return to the registered name.
    ///
    /// Under `Regenerate` this always rotates to a fresh keypair, even when not
    /// impersonating. Under `RetainOriginal` the pre-impersonation keypair is
    /// restored, and reverting while registered returns `None`.
    pub fn revert(&mut self) -> Result<Option<Registration>, KeyError> {
        let keys = match (self.policy, self.retained.take()) {
            (_, Some(original)) => original,
            (RevertPolicy::Regenerate, None) => self.params.generate()?,
            (RevertPolicy::RetainOriginal, None) => {
                debug!("revert requested while not impersonating");
                return Ok(None);
            }
        };
        self.keys = keys;

        let name = self.registered_username().to_string();
        info!(%name, policy = %self.policy, "reverted to registered identity");
        self.state = IdentityState::Registered { name };
        Ok(Some(self.registration()))
    }
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("state", &self.state)
            .field("public", self.keys.public())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
