//! Test harness: a synchronous in-memory hub.
//!
//! Relays events between [`SessionController`]s the way the TCP hub does:
//! `init` on join, `newUser` to everyone but the registrant, `message` to
//! everyone including the sender. A tamper hook can rewrite events in flight
//! to play the untrusted hub.

use ht_proto::{ClientEvent, KeyRecord, ServerEvent};

use crate::errors::CoreError;
use crate::session::{Notice, Output, SessionConfig, SessionController};

pub type ClientId = usize;

type TamperFn = Box<dyn FnMut(&mut ClientEvent)>;

#[derive(Default)]
pub struct LoopbackHub {
    sessions: Vec<SessionController>,
    transcripts: Vec<Vec<Notice>>,
    registry: Vec<(String, String)>,
    relayed: Vec<ClientEvent>,
    tamper: Option<TamperFn>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new client: it receives `init`, then registers.
    pub fn join(&mut self, username: &str, config: SessionConfig) -> Result<ClientId, CoreError> {
        let session = SessionController::new(username, config)?;
        Ok(self.join_with(session))
    }

    pub fn join_with(&mut self, session: SessionController) -> ClientId {
        let id = self.sessions.len();
        self.sessions.push(session);
        self.transcripts.push(Vec::new());

        self.deliver(id, ServerEvent::Init(self.registry.clone()));
        let out = self.sessions[id].start();
        self.dispatch(id, out);
        id
    }

    /// Feed one input line to a client.
    pub fn type_line(&mut self, id: ClientId, line: &str) {
        let out = self.sessions[id].handle_line(line);
        self.dispatch(id, out);
    }

    /// Relay an event as if a raw, non-session client sent it.
    pub fn send_raw(&mut self, event: ClientEvent) {
        self.relay(None, event);
    }

    /// Rewrite every relayed event with `f`.
    pub fn tamper_with(&mut self, f: impl FnMut(&mut ClientEvent) + 'static) {
        self.tamper = Some(Box::new(f));
    }

    /// Disconnect every client.
    pub fn shutdown(&mut self) {
        for id in 0..self.sessions.len() {
            self.deliver(id, ServerEvent::Disconnect);
        }
    }

    pub fn session(&self, id: ClientId) -> &SessionController {
        &self.sessions[id]
    }

    pub fn notices(&self, id: ClientId) -> &[Notice] {
        &self.transcripts[id]
    }

    /// Every event the hub relayed, after tampering.
    pub fn relayed(&self) -> &[ClientEvent] {
        &self.relayed
    }

    pub fn registry(&self) -> &[(String, String)] {
        &self.registry
    }

    fn dispatch(&mut self, from: ClientId, outputs: Vec<Output>) {
        for output in outputs {
            match output {
                Output::Display(notice) => self.transcripts[from].push(notice),
                Output::Emit(event) => self.relay(Some(from), event),
            }
        }
    }

    fn relay(&mut self, from: Option<ClientId>, mut event: ClientEvent) {
        if let Some(tamper) = self.tamper.as_mut() {
            tamper(&mut event);
        }
        self.relayed.push(event.clone());

        match event {
            ClientEvent::RegisterPublicKey(record) => {
                self.register(&record);
                for id in 0..self.sessions.len() {
                    if Some(id) != from {
                        self.deliver(id, ServerEvent::NewUser(record.clone()));
                    }
                }
            }
            ClientEvent::Message(wire) => {
                for id in 0..self.sessions.len() {
                    self.deliver(id, ServerEvent::Message(wire.clone()));
                }
            }
        }
    }

    fn register(&mut self, record: &KeyRecord) {
        match self.registry.iter_mut().find(|(name, _)| *name == record.username) {
            Some(entry) => entry.1 = record.public_key.clone(),
            None => self
                .registry
                .push((record.username.clone(), record.public_key.clone())),
        }
    }

    fn deliver(&mut self, to: ClientId, event: ServerEvent) {
        let out = self.sessions[to].handle_event(event);
        self.dispatch(to, out);
    }
}
