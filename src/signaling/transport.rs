use crate::error::{Error, Result};
use crate::signaling::message::{Announcement, OutboundMessage};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Stream of inbound announcements handed to the single registered listener.
pub type AnnouncementStream = mpsc::UnboundedReceiver<Announcement>;

/// Duplex channel to the relay server.
///
/// There is no reconnect and no delivery guarantee: once the link drops the
/// listener simply stops receiving and sends are discarded.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the connection to `address`.
    async fn connect(&self, address: &str) -> Result<()>;

    /// Transmits `message` if connected; otherwise drops it.
    fn send(&self, message: &OutboundMessage);

    /// Registers the listener. A previously returned stream is closed.
    fn listen(&self) -> AnnouncementStream;

    /// Closes the connection. Safe to call when already closed.
    async fn disconnect(&self);
}

struct Link {
    address: String,
    outgoing: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// [`Transport`] over a WebSocket, with JSON text frames.
pub struct WsTransport {
    name: String,
    listener: Arc<Mutex<Option<mpsc::UnboundedSender<Announcement>>>>,
    link: Mutex<Option<Link>>,
}

impl WsTransport {
    /// `name` only tags log lines, usually the room identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener: Arc::new(Mutex::new(None)),
            link: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.lock().is_some()
    }

    async fn writer_task(
        name: String,
        mut write: SplitSink<WsStream, Message>,
        mut outgoing: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = outgoing.recv().await {
            if let Err(e) = write.send(msg).await {
                warn!(transport = %name, "failed to send message: {}", e);
                break;
            }
        }
        if let Err(e) = write.close().await {
            debug!(transport = %name, "close handshake failed: {}", e);
        }
    }

    async fn reader_task(
        name: String,
        mut read: SplitStream<WsStream>,
        listener: Arc<Mutex<Option<mpsc::UnboundedSender<Announcement>>>>,
    ) {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<Announcement>(&text) {
                    Ok(announcement) => {
                        if let Some(tx) = listener.lock().as_ref() {
                            let _ = tx.send(announcement);
                        }
                    }
                    Err(e) => warn!(transport = %name, "dropping malformed message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!(transport = %name, "connection closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(transport = %name, "receive failed: {}", e);
                    break;
                }
            }
        }
        debug!(transport = %name, "reader stopped");
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, address: &str) -> Result<()> {
        let url = url::Url::parse(address)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Transport(format!(
                "unsupported signaling scheme {:?}",
                url.scheme()
            )));
        }
        self.disconnect().await;

        let (ws_stream, _) = connect_async(address).await?;
        let (write, read) = ws_stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(Self::writer_task(self.name.clone(), write, outgoing_rx));
        let reader = tokio::spawn(Self::reader_task(
            self.name.clone(),
            read,
            self.listener.clone(),
        ));

        info!(transport = %self.name, "connected to {}", address);
        *self.link.lock() = Some(Link {
            address: address.to_string(),
            outgoing,
            writer,
            reader,
        });
        Ok(())
    }

    fn send(&self, message: &OutboundMessage) {
        let link = self.link.lock();
        let Some(link) = link.as_ref() else {
            debug!(transport = %self.name, dst = %message.dst, "not connected, dropping message");
            return;
        };
        match serde_json::to_string(message) {
            Ok(json) => {
                if link.outgoing.send(Message::Text(json)).is_err() {
                    debug!(transport = %self.name, dst = %message.dst, "writer gone, dropping message");
                }
            }
            Err(e) => warn!(transport = %self.name, "failed to serialize message: {}", e),
        }
    }

    fn listen(&self) -> AnnouncementStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.listener.lock().replace(tx).is_some() {
            warn!(transport = %self.name, "listener replaced");
        }
        rx
    }

    async fn disconnect(&self) {
        let link = self.link.lock().take();
        let Some(link) = link else {
            return;
        };
        let Link {
            address,
            outgoing,
            mut writer,
            reader,
        } = link;

        drop(outgoing);
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            writer.abort();
        }
        reader.abort();
        info!(transport = %self.name, "connection with {} is closed", address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::message::{AnnouncementKind, SessionDescription};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn relay() -> (String, mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => { let _ = seen_tx.send(text); }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        _ => {}
                    },
                    Some(text) = push_rx.recv() => {
                        write.send(Message::Text(text)).await.unwrap();
                    }
                }
            }
        });

        (format!("ws://{}/room/r1/user/alice", addr), seen_rx, push_tx)
    }

    #[tokio::test]
    async fn delivers_inbound_and_sends_outbound() {
        let (address, mut seen, push) = relay().await;
        let transport = WsTransport::new("r1");
        let mut inbound = transport.listen();
        transport.connect(&address).await.unwrap();

        push.send(r#"{"src":"bob","type":"joined"}"#.to_string()).unwrap();
        let ann = inbound.recv().await.unwrap();
        assert_eq!(ann.kind, AnnouncementKind::Joined);

        let msg = OutboundMessage::offer("bob".into(), &SessionDescription::offer("v=0")).unwrap();
        transport.send(&msg);
        let raw = seen.recv().await.unwrap();
        let echoed: OutboundMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(echoed, msg);

        transport.disconnect().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn skips_malformed_frames() {
        let (address, _seen, push) = relay().await;
        let transport = WsTransport::new("r1");
        let mut inbound = transport.listen();
        transport.connect(&address).await.unwrap();

        push.send("not json".to_string()).unwrap();
        push.send(r#"{"src":"bob","type":"left"}"#.to_string()).unwrap();
        let ann = inbound.recv().await.unwrap();
        assert_eq!(ann.kind, AnnouncementKind::Left);

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn send_without_connection_is_dropped() {
        let transport = WsTransport::new("r1");
        let msg = OutboundMessage::offer("bob".into(), &SessionDescription::offer("v=0")).unwrap();
        transport.send(&msg);
        transport.disconnect().await;
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn rejects_non_websocket_address() {
        let transport = WsTransport::new("r1");
        let result = transport.connect("http://127.0.0.1:8080/signal").await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(matches!(transport.connect("not an address").await, Err(Error::Url(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn second_listener_closes_first() {
        let transport = WsTransport::new("r1");
        let mut first = transport.listen();
        let _second = transport.listen();
        assert!(first.recv().await.is_none());
    }
}
