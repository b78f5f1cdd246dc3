//! WebSocket transport implementation
//!
//! Each accepted (or connected) stream is split into a writer task fed by a
//! bounded queue and a reader task that turns frames into [`TransportEvent`]s.
//! Outbound payloads that are valid UTF-8 go out as text frames, since
//! browser clients exchange JSON.
//!
//! The server upgrades each TCP connection in its own task, so a peer that
//! never finishes the handshake cannot hold up the ones behind it.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Outbound frames queued per connection before `try_send` reports full
    pub send_queue: usize,
    /// Inbound events buffered per connection
    pub recv_queue: usize,
    /// Upgraded connections waiting for `accept`
    pub accept_queue: usize,
    /// Time a TCP peer gets to complete the upgrade request
    pub handshake_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            send_queue: 256,
            recv_queue: 100,
            accept_queue: 64,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket client transport
pub struct WebSocketTransport;

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
    abort: Arc<Notify>,
}

impl WebSocketSender {
    fn frame(data: Bytes) -> WsMessage {
        match String::from_utf8(data.to_vec()) {
            Ok(text) => WsMessage::Text(text),
            Err(e) => WsMessage::Binary(e.into_bytes()),
        }
    }
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(Self::frame(data))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn try_send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx.try_send(Self::frame(data)).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::ConnectionClosed,
        })
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock() && !self.tx.is_closed()
    }

    /// Never waits on the peer. If the queue is full the writer is torn
    /// down and pending frames are discarded.
    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        if let Err(TrySendError::Full(_)) = self.tx.try_send(WsMessage::Close(None)) {
            debug!("WebSocket send queue full on close, aborting writer");
            self.abort.notify_one();
        }
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Split a WebSocket stream into writer/reader tasks
fn spawn_io<S>(
    ws_stream: WebSocketStream<S>,
    config: &WebSocketConfig,
) -> (WebSocketSender, WebSocketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(config.send_queue);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(config.recv_queue);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();
    let abort = Arc::new(Notify::new());
    let abort_write = abort.clone();

    // Writer
    tokio::spawn(async move {
        let drain = async {
            while let Some(msg) = send_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = write.send(msg).await {
                    debug!("WebSocket write error: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        };
        tokio::select! {
            _ = drain => {}
            _ = abort_write.notified() => debug!("WebSocket writer aborted"),
        }
        *connected_write.lock() = false;
    });

    // Reader
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        let mut reason = None;
        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    if event_tx
                        .send(TransportEvent::Data(Bytes::from(text)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(WsMessage::Binary(data)) => {
                    if event_tx
                        .send(TransportEvent::Data(Bytes::from(data)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(WsMessage::Close(frame)) => {
                    reason = frame.map(|f| f.reason.to_string());
                    break;
                }
                // Pings are answered by tungstenite
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket read error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    reason = Some(e.to_string());
                    break;
                }
            }
        }

        *connected_read.lock() = false;
        let _ = event_tx
            .send(TransportEvent::Disconnected { reason })
            .await;
    });

    (
        WebSocketSender {
            tx: send_tx,
            connected,
            abort,
        },
        WebSocketReceiver { rx: event_rx },
    )
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, response) = connect_async(url).await.map_err(|e| match e {
            tokio_tungstenite::tungstenite::Error::Url(e) => TransportError::InvalidUrl(e.to_string()),
            e => TransportError::ConnectionFailed(e.to_string()),
        })?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_io(ws_stream, &WebSocketConfig::default()))
    }
}

type Accepted = (WebSocketSender, WebSocketReceiver, SocketAddr);

/// WebSocket server
///
/// A background task owns the listener. Connections reach
/// [`accept`](TransportServer::accept) only once their upgrade succeeded.
pub struct WebSocketServer {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<Accepted>,
    acceptor: JoinHandle<()>,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, WebSocketConfig::default()).await
    }

    pub async fn bind_with_config(addr: &str, config: WebSocketConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        info!("WebSocket server listening on {}", local_addr);

        let (ready, incoming) = mpsc::channel(config.accept_queue.max(1));
        let acceptor = tokio::spawn(accept_loop(listener, config, ready));

        Ok(Self {
            local_addr,
            incoming,
            acceptor,
        })
    }
}

impl Drop for WebSocketServer {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: WebSocketConfig,
    ready: mpsc::Sender<Accepted>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("TCP accept error: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };
        if ready.is_closed() {
            break;
        }

        debug!("Accepted TCP connection from {}", addr);
        tokio::spawn(handshake(stream, addr, config.clone(), ready.clone()));
    }
}

async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    config: WebSocketConfig,
    ready: mpsc::Sender<Accepted>,
) {
    let upgrade = tokio_tungstenite::accept_async(stream);
    let ws_stream = match timeout(config.handshake_timeout, upgrade).await {
        Ok(Ok(ws_stream)) => ws_stream,
        Ok(Err(e)) => {
            debug!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
        Err(_) => {
            debug!("WebSocket handshake with {} timed out", addr);
            return;
        }
    };

    info!("WebSocket client connected from {}", addr);

    let (sender, receiver) = spawn_io(ws_stream, &config);
    if ready.send((sender, receiver, addr)).await.is_err() {
        debug!("Server gone, dropping connection from {}", addr);
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        self.incoming.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }
}
