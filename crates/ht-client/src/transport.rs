//! Line-delimited JSON transport to the hub.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use ht_core::{HubTransport, TransportError};
use ht_proto::{
    decode_line, encode_line, ClientEvent, Frame, LineReader, ServerEvent, WireError, MAX_LINE_BYTES,
};

/// One JSON event per line in each direction. Inbound lines are capped at
/// [`MAX_LINE_BYTES`]; longer ones are skipped without being buffered.
pub struct LineTransport<R, W> {
    lines: LineReader<BufReader<R>>,
    writer: W,
}

pub type TcpTransport = LineTransport<OwnedReadHalf, OwnedWriteHalf>;

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: LineReader::new(BufReader::new(reader), MAX_LINE_BYTES),
            writer,
        }
    }
}

impl TcpTransport {
    /// Connect to the hub at `addr`.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected to hub");
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

#[async_trait]
impl<R, W> HubTransport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let line = encode_line(event)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Cancel safe: the line reader keeps partial input across calls.
    async fn recv(&mut self) -> Result<ServerEvent, TransportError> {
        loop {
            let raw = match self.lines.next_frame().await? {
                Frame::Line(raw) => raw,
                Frame::TooLong(len) => {
                    return Err(WireError::TooLarge(len, self.lines.max()).into());
                }
                Frame::Eof => return Err(TransportError::Disconnected),
            };
            // Invalid UTF-8 surfaces as a malformed line.
            let line = String::from_utf8_lossy(&raw);
            if line.trim().is_empty() {
                continue;
            }
            return Ok(decode_line(&line)?);
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, split, AsyncBufReadExt};

    use super::*;
    use ht_proto::{KeyRecord, WireMessage};

    #[tokio::test]
    async fn test_send_writes_one_line_per_event() {
        let (client, hub) = duplex(4096);
        let (client_r, client_w) = split(client);
        let mut transport = LineTransport::new(client_r, client_w);

        transport
            .send(&ClientEvent::Message(WireMessage::plain("alice", "hi")))
            .await
            .unwrap();
        transport.close().await.unwrap();

        let (hub_r, _hub_w) = split(hub);
        let mut lines = BufReader::new(hub_r).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let event: ClientEvent = decode_line(&line).unwrap();
        assert_eq!(event, ClientEvent::Message(WireMessage::plain("alice", "hi")));
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recv_decodes_and_skips_blank_lines() {
        let (client, mut hub) = duplex(4096);
        let (client_r, client_w) = split(client);
        let mut transport = LineTransport::new(client_r, client_w);

        let event = ServerEvent::NewUser(KeyRecord {
            username: "bob".into(),
            public_key: "k".into(),
        });
        let mut wire = String::from("\n");
        wire.push_str(&encode_line(&event).unwrap());
        hub.write_all(wire.as_bytes()).await.unwrap();

        assert_eq!(transport.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_recv_malformed_line_is_not_terminal() {
        let (client, mut hub) = duplex(4096);
        let (client_r, client_w) = split(client);
        let mut transport = LineTransport::new(client_r, client_w);

        hub.write_all(b"{not json}\n{\"event\":\"disconnect\"}\n")
            .await
            .unwrap();

        let err = transport.recv().await.unwrap_err();
        assert!(!err.is_terminal());
        assert_eq!(transport.recv().await.unwrap(), ServerEvent::Disconnect);
    }

    #[tokio::test]
    async fn test_recv_skips_oversize_line() {
        let (client, mut hub) = duplex(1 << 20);
        let (client_r, client_w) = split(client);
        let mut transport = LineTransport::new(client_r, client_w);

        let huge = format!("{}\n", "z".repeat(MAX_LINE_BYTES * 4));
        hub.write_all(huge.as_bytes()).await.unwrap();
        hub.write_all(b"{\"event\":\"disconnect\"}\n").await.unwrap();

        let err = transport.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Wire(WireError::TooLarge(len, MAX_LINE_BYTES)) if len == MAX_LINE_BYTES * 4
        ));
        assert!(!err.is_terminal());
        assert_eq!(transport.recv().await.unwrap(), ServerEvent::Disconnect);
    }

    #[tokio::test]
    async fn test_recv_eof_is_disconnect() {
        let (client, hub) = duplex(64);
        let (client_r, client_w) = split(client);
        let mut transport = LineTransport::new(client_r, client_w);
        drop(hub);

        assert!(matches!(
            transport.recv().await,
            Err(TransportError::Disconnected)
        ));
    }
}
