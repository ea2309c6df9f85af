//! TCP broadcast hub
//!
//! Each connection gets a reader task and a writer task. Readers decode
//! client events and fan encoded lines out to every writer's bounded queue;
//! a full queue drops the line for that client only.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use ht_proto::{
    decode_line, encode_init_lines, encode_line, ClientEvent, Frame, KeyRecord, LineReader,
    ServerEvent, WireError,
};

use crate::config::ServerConfig;

/// How long shutdown waits for queued lines to reach clients.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("line is not UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

pub type ConnId = u64;

type Line = Arc<str>;

/// State shared by all connection tasks.
///
/// Lock order is `registry` then `peers`. `join` holds the registry lock
/// from the roster snapshot until the peer is inserted, and `register` holds
/// it from the update until the broadcast is queued, so a joining client
/// learns each key exactly once: in its `init` or in a later `newUser`.
#[derive(Default)]
struct HubState {
    peers: DashMap<ConnId, mpsc::Sender<Line>>,
    /// (username, PEM) in first-registration order. Never pruned.
    registry: RwLock<Vec<(String, String)>>,
    next_id: AtomicU64,
}

impl HubState {
    /// Queue the roster for a new client, then make it visible to broadcasts.
    ///
    /// The queue holds `queue` lines on top of the `init` chunks.
    fn join(&self, id: ConnId, queue: usize) -> mpsc::Receiver<Line> {
        let registry = self.registry.read();
        let init = encode_init_lines(&registry).unwrap_or_else(|e| {
            warn!(conn = id, error = %e, "could not encode roster");
            Vec::new()
        });
        let (tx, rx) = mpsc::channel(queue + init.len());
        debug!(conn = id, chunks = init.len(), "queueing init");
        for line in init {
            if tx.try_send(Arc::from(line)).is_err() {
                warn!(conn = id, "could not queue init");
            }
        }
        self.peers.insert(id, tx);
        rx
    }

    /// Record a key and announce it to every client except the registrant.
    fn register(&self, id: ConnId, record: KeyRecord) -> Result<(), WireError> {
        let announcement = encode(&ServerEvent::NewUser(record.clone()))?;
        let mut registry = self.registry.write();
        match registry.iter_mut().find(|(name, _)| *name == record.username) {
            Some(entry) => entry.1 = record.public_key,
            None => registry.push((record.username, record.public_key)),
        }
        self.broadcast(announcement, Some(id));
        Ok(())
    }

    #[cfg(test)]
    fn roster(&self) -> Vec<(String, String)> {
        self.registry.read().clone()
    }

    fn broadcast(&self, line: Line, except: Option<ConnId>) {
        for peer in self.peers.iter() {
            if Some(*peer.key()) == except {
                continue;
            }
            if peer.value().try_send(line.clone()).is_err() {
                warn!(conn = *peer.key(), "client queue full or closed, dropping line");
            }
        }
    }
}

fn encode(event: &ServerEvent) -> Result<Line, WireError> {
    Ok(Arc::from(encode_line(event)?))
}

pub struct HubServer {
    config: ServerConfig,
    state: Arc<HubState>,
}

impl HubServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(HubState::default()),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener, HubError> {
        Ok(TcpListener::bind(self.config.listen_addr).await?)
    }

    /// Connected clients.
    pub fn connected(&self) -> usize {
        self.state.peers.len()
    }

    /// Usernames with a key on record.
    pub fn registered(&self) -> usize {
        self.state.registry.read().len()
    }

    /// Accept clients on `listener` until `shutdown` resolves, then send
    /// every client `disconnect`.
    pub async fn run<S>(&self, listener: TcpListener, shutdown: S) -> Result<(), HubError>
    where
        S: Future<Output = ()>,
    {
        info!(addr = %listener.local_addr()?, "hub listening");
        tokio::pin!(shutdown);

        let mut readers = JoinSet::new();
        let mut writers = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    self.admit(stream, addr, &mut readers, &mut writers).await;
                }
                Some(_) = readers.join_next() => {}
                Some(_) = writers.join_next() => {}
            }
        }

        info!(clients = self.connected(), "shutting down");
        self.state.broadcast(encode(&ServerEvent::Disconnect)?, None);
        self.state.peers.clear();
        readers.shutdown().await;

        let drain = async { while writers.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("timed out flushing client queues");
        }
        Ok(())
    }

    async fn admit(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        readers: &mut JoinSet<()>,
        writers: &mut JoinSet<()>,
    ) {
        if self.state.peers.len() >= self.config.max_clients {
            warn!(%addr, max = self.config.max_clients, "client limit reached, refusing");
            refuse(stream).await;
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, error = %e, "set_nodelay failed");
        }

        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let rx = self.state.join(id, self.config.outbound_queue);
        info!(conn = id, %addr, clients = self.state.peers.len(), "client connected");

        writers.spawn(write_loop(id, writer, rx));
        readers.spawn(read_loop(
            id,
            reader,
            self.state.clone(),
            self.config.max_line_bytes,
        ));
    }
}

async fn refuse(mut stream: TcpStream) {
    if let Ok(line) = encode(&ServerEvent::Disconnect) {
        let _ = stream.write_all(line.as_bytes()).await;
    }
    let _ = stream.shutdown().await;
}

async fn write_loop(id: ConnId, mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Line>) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!(conn = id, error = %e, "write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(id: ConnId, reader: OwnedReadHalf, state: Arc<HubState>, max_line_bytes: usize) {
    let mut lines = LineReader::new(BufReader::new(reader), max_line_bytes);

    loop {
        match lines.next_frame().await {
            Ok(Frame::Line(raw)) => {
                if let Err(e) = handle_line(id, &raw, &state) {
                    warn!(conn = id, error = %e, "dropping malformed line");
                }
            }
            Ok(Frame::TooLong(len)) => {
                warn!(conn = id, len, max = max_line_bytes, "dropping oversize line");
            }
            Ok(Frame::Eof) => break,
            Err(e) => {
                debug!(conn = id, error = %e, "read failed");
                break;
            }
        }
    }

    // Dropping the sender ends the writer. Registrations stay on record.
    state.peers.remove(&id);
    info!(conn = id, clients = state.peers.len(), "client disconnected");
}

fn handle_line(id: ConnId, raw: &[u8], state: &HubState) -> Result<(), HubError> {
    let text = std::str::from_utf8(raw)?;
    if text.trim().is_empty() {
        return Ok(());
    }

    let event: ClientEvent = decode_line(text)?;
    debug!(conn = id, event = event.name(), "client event");
    match event {
        ClientEvent::RegisterPublicKey(record) => {
            info!(conn = id, username = %record.username, "key registered");
            state.register(id, record)?;
        }
        ClientEvent::Message(message) => {
            state.broadcast(encode(&ServerEvent::Message(message))?, None);
        }
    }
    Ok(())
}
