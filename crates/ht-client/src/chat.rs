//! The interactive chat loop.
//!
//! Input lines, hub events and shutdown are raced on one task, so the
//! session sees a single ordered stream of work. Every `Emit` is sent before
//! the next input is taken.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{debug, info, warn};

use ht_core::{CoreError, HubTransport, Output, SessionController, SessionStats, TransportError};
use ht_proto::ServerEvent;

use crate::output::Renderer;

/// Why the chat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEnd {
    /// Input reached end of file.
    InputClosed,
    /// The hub went away.
    HubDisconnected,
    /// The shutdown future fired (ctrl-c).
    Interrupted,
}

#[derive(Debug)]
pub struct ChatSummary {
    pub end: ChatEnd,
    pub stats: SessionStats,
}

/// Drive `session` until input ends, the hub disconnects, or `shutdown` resolves.
pub async fn run_chat<T, I, O, S>(
    session: &mut SessionController,
    transport: &mut T,
    input: &mut Lines<I>,
    out: &mut O,
    renderer: Renderer,
    shutdown: S,
) -> Result<ChatSummary, CoreError>
where
    T: HubTransport,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let start = session.start();
    apply(start, transport, out, renderer).await?;

    let end = loop {
        if session.is_closed() {
            break ChatEnd::HubDisconnected;
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted");
                break ChatEnd::Interrupted;
            }
            line = input.next_line() => {
                let Some(line) = line.map_err(TransportError::Io)? else {
                    debug!("input closed");
                    break ChatEnd::InputClosed;
                };
                let outputs = session.handle_line(&line);
                apply(outputs, transport, out, renderer).await?;
            }
            event = transport.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(TransportError::Disconnected) => ServerEvent::Disconnect,
                    Err(e) => {
                        let e = CoreError::from(e);
                        if !e.is_recoverable() {
                            return Err(e);
                        }
                        warn!(error = %e, "dropping malformed hub line");
                        continue;
                    }
                };
                let outputs = session.handle_event(event);
                apply(outputs, transport, out, renderer).await?;
            }
        }
    };

    if end != ChatEnd::HubDisconnected {
        if let Err(e) = transport.close().await {
            debug!(error = %e, "close failed");
        }
    }

    let stats = session.stats().clone();
    info!(
        sent = stats.sent,
        received = stats.received,
        trusted = stats.trusted,
        opaque = stats.opaque,
        anomalies = stats.anomaly_total(),
        ?end,
        "session ended"
    );
    debug!(known = ?session.directory().usernames(), "key directory at exit");
    Ok(ChatSummary { end, stats })
}

async fn apply<T, O>(
    outputs: Vec<Output>,
    transport: &mut T,
    out: &mut O,
    renderer: Renderer,
) -> Result<(), CoreError>
where
    T: HubTransport,
    O: AsyncWrite + Unpin,
{
    for output in outputs {
        match output {
            Output::Emit(event) => {
                debug!(event = event.name(), "sending");
                transport.send(&event).await?;
            }
            Output::Display(notice) => {
                let mut line = renderer.render(&notice);
                line.push('\n');
                out.write_all(line.as_bytes())
                    .await
                    .map_err(TransportError::Io)?;
            }
        }
    }
    out.flush().await.map_err(TransportError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;
    use crate::output::OutputFormat;
    use ht_core::{KeyParams, RevertPolicy, SessionConfig};
    use ht_crypto::envelope::SecurityMode;
    use ht_crypto::keys::KeyEncoding;
    use ht_proto::{ClientEvent, WireMessage, WireError};

    /// Scripted hub: replays queued events, then reports a disconnect.
    #[derive(Default)]
    struct ScriptedHub {
        inbound: VecDeque<Result<ServerEvent, TransportError>>,
        sent: Vec<ClientEvent>,
        closed: bool,
        hold_open: bool,
    }

    #[async_trait]
    impl HubTransport for ScriptedHub {
        async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
            self.sent.push(event.clone());
            Ok(())
        }

        async fn recv(&mut self) -> Result<ServerEvent, TransportError> {
            match self.inbound.pop_front() {
                Some(next) => next,
                None if self.hold_open => std::future::pending().await,
                None => Err(TransportError::Disconnected),
            }
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }
    }

    fn session(mode: SecurityMode) -> SessionController {
        let config = SessionConfig {
            mode,
            key_params: KeyParams {
                bits: 1024,
                encoding: KeyEncoding::Spki,
            },
            revert_policy: RevertPolicy::Regenerate,
        };
        SessionController::new("alice", config).unwrap()
    }

    #[tokio::test]
    async fn test_hub_disconnect_ends_chat() {
        let mut session = session(SecurityMode::Plain);
        let mut hub = ScriptedHub::default();
        hub.inbound.push_back(Ok(ServerEvent::Init(vec![])));
        hub.inbound.push_back(Err(TransportError::Wire(WireError::TooLarge(1, 0))));
        hub.inbound
            .push_back(Ok(ServerEvent::Message(WireMessage::plain("bob", "hey"))));

        // Input never yields, so only hub events drive the loop.
        let (_keep, pending_input) = tokio::io::duplex(16);
        let mut input = BufReader::new(pending_input).lines();
        let mut out = Vec::new();

        let summary = run_chat(
            &mut session,
            &mut hub,
            &mut input,
            &mut out,
            Renderer::new(OutputFormat::Text, true),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(summary.end, ChatEnd::HubDisconnected);
        assert_eq!(summary.stats.received, 1);
        assert!(matches!(hub.sent[0], ClientEvent::RegisterPublicKey(_)));
        assert!(!hub.closed);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Welcome to the chat, alice",
                "There are currently 0 users in the chat",
                "bob: hey",
                "Disconnected from hub",
            ]
        );
    }

    #[tokio::test]
    async fn test_input_lines_are_sent() {
        let mut session = session(SecurityMode::Hashed);
        let mut hub = ScriptedHub {
            hold_open: true,
            ..Default::default()
        };

        let script: &[u8] = b"hello\n\nsecond line\n";
        let mut input = BufReader::new(script).lines();
        let mut out = Vec::new();

        let summary = run_chat(
            &mut session,
            &mut hub,
            &mut input,
            &mut out,
            Renderer::new(OutputFormat::Json, true),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(summary.end, ChatEnd::InputClosed);
        assert_eq!(summary.stats.sent, 2);
        assert!(hub.closed);

        let messages: Vec<&WireMessage> = hub
            .sent
            .iter()
            .filter_map(|e| match e {
                ClientEvent::Message(m) => Some(m),
                ClientEvent::RegisterPublicKey(_) => None,
            })
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, "hello");
        assert!(messages[0].hash.is_some());
        assert_eq!(messages[1].message, "second line");
    }

    #[tokio::test]
    async fn test_shutdown_interrupts() {
        let mut session = session(SecurityMode::Plain);
        let mut hub = ScriptedHub {
            hold_open: true,
            ..Default::default()
        };
        let (_keep, pending_input) = tokio::io::duplex(16);
        let mut input = BufReader::new(pending_input).lines();
        let mut out = Vec::new();

        let summary = run_chat(
            &mut session,
            &mut hub,
            &mut input,
            &mut out,
            Renderer::new(OutputFormat::Text, true),
            async {},
        )
        .await
        .unwrap();

        assert_eq!(summary.end, ChatEnd::Interrupted);
        assert!(hub.closed);
    }

    #[tokio::test]
    async fn test_io_failure_ends_chat_with_error() {
        let mut session = session(SecurityMode::Plain);
        let mut hub = ScriptedHub::default();
        hub.inbound.push_back(Ok(ServerEvent::Init(vec![])));
        hub.inbound.push_back(Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))));

        let (_keep, pending_input) = tokio::io::duplex(16);
        let mut input = BufReader::new(pending_input).lines();
        let mut out = Vec::new();

        let result = run_chat(
            &mut session,
            &mut hub,
            &mut input,
            &mut out,
            Renderer::new(OutputFormat::Text, true),
            std::future::pending(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(matches!(err, CoreError::Transport(TransportError::Io(_))));
    }
}
