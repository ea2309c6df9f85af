//! Session controller: one chat participant's view of the hub.
//!
//! The controller owns the key directory and the local identity and turns
//! input lines and hub events into [`Output`]s. It performs no I/O; the
//! caller sends every `Emit` to the hub and renders every `Display`, in order.

use std::collections::BTreeMap;
use std::fmt;

use ht_crypto::envelope::{
    wrap_encrypted, wrap_hashed, wrap_plain, wrap_signed, Envelope, SecurityMode,
};
use ht_crypto::keys::KeyMaterial;
use ht_proto::validation::validate_username;
use ht_proto::{ClientEvent, KeyRecord, ServerEvent, WireMessage};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::directory::{KeyChanged, KeyDirectory};
use crate::errors::CoreError;
use crate::identity::{IdentityContext, KeyParams, Registration, RevertPolicy};
use crate::trust::{Anomaly, Evaluation, TrustEvaluator, Verdict};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub mode: SecurityMode,
    pub key_params: KeyParams,
    pub revert_policy: RevertPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Send to the hub.
    Emit(ClientEvent),
    /// Show to the user.
    Display(Notice),
}

/// Something to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Welcome { username: String },
    Roster { count: usize },
    Joined { username: String },
    KeyChanged(KeyChanged),
    Chat(Evaluation),
    SecretStarted { target: String, key_known: bool },
    SecretEnded { target: String },
    Impersonating { username: String },
    Reverted { username: String },
    /// A local failure; nothing was sent.
    Error(String),
    Disconnected,
}

impl Notice {
    /// The anomaly this notice carries, if any.
    pub fn anomaly(&self) -> Option<Anomaly> {
        match self {
            Notice::KeyChanged(_) => Some(Anomaly::KeyChanged),
            Notice::Chat(eval) => eval.verdict.anomaly(),
            _ => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Welcome { username } => write!(f, "Welcome to the chat, {username}"),
            Notice::Roster { count } => write!(f, "There are currently {count} users in the chat"),
            Notice::Joined { username } => write!(f, "{username} join the chat"),
            Notice::KeyChanged(change) => write!(
                f,
                "{} for {}: {} -> {}",
                Anomaly::KeyChanged.warning_text(),
                change.username,
                change.previous.short_fingerprint(),
                change.current.short_fingerprint()
            ),
            Notice::Chat(eval) => {
                if let Some(anomaly) = eval.verdict.anomaly() {
                    writeln!(f, "{}", anomaly.warning_text())?;
                }
                write!(f, "{}: {}", eval.sender, eval.text)
            }
            Notice::SecretStarted { target, key_known } => {
                write!(f, "Now secretly chatting with {target}")?;
                if !key_known {
                    write!(f, " (no public key known yet)")?;
                }
                Ok(())
            }
            Notice::SecretEnded { target } => write!(f, "No more secretly chatting with {target}"),
            Notice::Impersonating { username } => write!(f, "Now impersonating {username}"),
            Notice::Reverted { username } => write!(f, "Now you are {username}"),
            Notice::Error(msg) => write!(f, "[ERROR] {msg}"),
            Notice::Disconnected => write!(f, "Disconnected from hub"),
        }
    }
}

/// Counters for one session, logged at exit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sent: u64,
    pub received: u64,
    pub trusted: u64,
    pub opaque: u64,
    pub anomalies: BTreeMap<Anomaly, u64>,
    pub registrations: u64,
}

impl SessionStats {
    pub fn anomaly_total(&self) -> u64 {
        self.anomalies.values().sum()
    }

    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Trusted => self.trusted += 1,
            Verdict::Opaque => self.opaque += 1,
            Verdict::Warning(anomaly) => self.record_anomaly(anomaly),
        }
    }

    fn record_anomaly(&mut self, anomaly: Anomaly) {
        *self.anomalies.entry(anomaly).or_insert(0) += 1;
    }
}

pub struct SessionController {
    mode: SecurityMode,
    identity: IdentityContext,
    directory: KeyDirectory,
    /// Conversation target for `!secret`, encrypted mode only.
    secret_target: Option<String>,
    stats: SessionStats,
    closed: bool,
}

impl SessionController {
    /// Validate the username and generate the initial keypair.
    pub fn new(username: &str, config: SessionConfig) -> Result<Self, CoreError> {
        validate_username(username)?;
        let identity = IdentityContext::new(username, config.key_params, config.revert_policy)?;
        Ok(Self::with_identity(identity, config.mode))
    }

    pub fn with_identity(identity: IdentityContext, mode: SecurityMode) -> Self {
        Self {
            mode,
            identity,
            directory: KeyDirectory::new(),
            secret_target: None,
            stats: SessionStats::default(),
            closed: false,
        }
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn directory(&self) -> &KeyDirectory {
        &self.directory
    }

    pub fn secret_target(&self) -> Option<&str> {
        self.secret_target.as_deref()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// True once the hub has disconnected us.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Announce our key. Call once, right after connecting.
    pub fn start(&mut self) -> Vec<Output> {
        let registration = self.identity.registration();
        let username = registration.username.clone();
        vec![
            self.announce(registration),
            Output::Display(Notice::Welcome { username }),
        ]
    }

    /// Process one line of user input.
    pub fn handle_line(&mut self, line: &str) -> Vec<Output> {
        if self.closed {
            debug!("input after disconnect ignored");
            return Vec::new();
        }

        match Command::parse(line, self.mode) {
            Command::Empty => Vec::new(),
            Command::Send(text) => self.send(&text),
            Command::EnterSecret(target) => {
                let key_known = self.directory.contains(&target);
                info!(%target, key_known, "secret conversation started");
                self.secret_target = Some(target.clone());
                vec![Output::Display(Notice::SecretStarted { target, key_known })]
            }
            Command::ExitSecret => match self.secret_target.take() {
                Some(target) => {
                    info!(%target, "secret conversation ended");
                    vec![Output::Display(Notice::SecretEnded { target })]
                }
                None => vec![Output::Display(Notice::Error(
                    "not in a secret conversation".to_string(),
                ))],
            },
            Command::Impersonate(target) => match self.identity.impersonate(&target) {
                Ok(registration) => vec![
                    self.announce(registration),
                    Output::Display(Notice::Impersonating { username: target }),
                ],
                Err(e) => self.local_error(CoreError::from(e)),
            },
            Command::RevertIdentity => match self.identity.revert() {
                Ok(registration) => {
                    let username = self.identity.active_username().to_string();
                    let mut out = Vec::with_capacity(2);
                    if let Some(registration) = registration {
                        out.push(self.announce(registration));
                    }
                    out.push(Output::Display(Notice::Reverted { username }));
                    out
                }
                Err(e) => self.local_error(CoreError::from(e)),
            },
        }
    }

    /// Process one event from the hub.
    pub fn handle_event(&mut self, event: ServerEvent) -> Vec<Output> {
        debug!(event = event.name(), "hub event");
        match event {
            ServerEvent::Init(entries) => {
                self.directory.bulk_load(
                    entries
                        .into_iter()
                        .map(|(username, pem)| (username, KeyMaterial::from_pem(pem))),
                );
                vec![Output::Display(Notice::Roster {
                    count: self.directory.len(),
                })]
            }
            ServerEvent::NewUser(record) => self.on_new_user(record),
            ServerEvent::Message(wire) => self.on_message(wire),
            ServerEvent::Disconnect => {
                info!("hub disconnected");
                self.closed = true;
                vec![Output::Display(Notice::Disconnected)]
            }
        }
    }

    fn on_new_user(&mut self, record: KeyRecord) -> Vec<Output> {
        let key = KeyMaterial::from_pem(record.public_key);
        let mut out = Vec::with_capacity(2);
        if let Some(change) = TrustEvaluator::on_registration(&mut self.directory, &record.username, key) {
            self.stats.record_anomaly(Anomaly::KeyChanged);
            out.push(Output::Display(Notice::KeyChanged(change)));
        }
        out.push(Output::Display(Notice::Joined {
            username: record.username,
        }));
        out
    }

    fn on_message(&mut self, wire: WireMessage) -> Vec<Output> {
        let env = Envelope::from_wire(wire, self.mode);
        let evaluator = TrustEvaluator::new(
            &self.directory,
            self.identity.active_username(),
            self.identity.keys(),
        );
        let Some(eval) = evaluator.evaluate(&env) else {
            return Vec::new();
        };

        self.stats.received += 1;
        self.stats.record(eval.verdict);
        if let Some(anomaly) = eval.verdict.anomaly() {
            warn!(sender = %eval.sender, %anomaly, "inbound message anomaly");
        }
        vec![Output::Display(Notice::Chat(eval))]
    }

    fn send(&mut self, text: &str) -> Vec<Output> {
        match self.wrap_outgoing(text) {
            Ok(env) => {
                self.stats.sent += 1;
                vec![Output::Emit(ClientEvent::Message(env.to_wire()))]
            }
            Err(e) => self.local_error(e),
        }
    }

    fn wrap_outgoing(&self, text: &str) -> Result<Envelope, CoreError> {
        let sender = self.identity.active_username();
        let env = match self.mode {
            SecurityMode::Plain => wrap_plain(sender, text),
            SecurityMode::Hashed => wrap_hashed(sender, text),
            SecurityMode::Encrypted => match &self.secret_target {
                Some(target) => {
                    let key = self
                        .directory
                        .lookup(target)
                        .ok_or_else(|| CoreError::UnknownRecipient(target.clone()))?;
                    wrap_encrypted(sender, text, key)?
                }
                None => wrap_plain(sender, text),
            },
            SecurityMode::Signed => wrap_signed(sender, text, self.identity.keys())?,
        };
        Ok(env)
    }

    fn announce(&mut self, registration: Registration) -> Output {
        info!(
            username = %registration.username,
            fingerprint = %registration.public_key.short_fingerprint(),
            "registering public key"
        );
        self.stats.registrations += 1;
        Output::Emit(registration.to_event())
    }

    fn local_error(&self, err: CoreError) -> Vec<Output> {
        warn!(error = %err, "local failure, nothing sent");
        vec![Output::Display(Notice::Error(err.to_string()))]
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("mode", &self.mode)
            .field("identity", &self.identity)
            .field("peers", &self.directory.len())
            .field("secret_target", &self.secret_target)
            .field("closed", &self.closed)
            .finish()
    }
}
