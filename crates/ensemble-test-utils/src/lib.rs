//! Common test helpers and utilities for Ensemble tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - Recording doubles for the transport and emitter seams
//! - A UDP OSC sink that decodes what the router emits
//! - A WebSocket test client speaking the client envelope format
//! - Test router management with RAII cleanup

use async_trait::async_trait;
use bytes::Bytes;
use ensemble_bridge::{Emitter, OscEmitter, OscEmitterConfig};
use ensemble_core::{ClientMessage, RoutedMessage, StateSnapshot};
use ensemble_router::{Router, RouterConfig};
use ensemble_transport::{
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
    TransportServer, WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport,
};
use parking_lot::Mutex;
use rosc::{OscMessage, OscPacket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait before deciding nothing else is coming
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Find an available UDP port for testing
pub fn find_available_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Assert that two values are approximately equal (for floating point)
pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: f64, msg: &str) {
    assert!(
        (actual - expected).abs() < epsilon,
        "{}: expected {} +/- {}, got {}",
        msg,
        expected,
        epsilon,
        actual
    );
}

// ============================================================================
// Recording Doubles
// ============================================================================

/// Transport sender that keeps every frame it is given
#[derive(Clone, Default)]
pub struct RecordingSender {
    frames: Arc<Mutex<Vec<Bytes>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames decoded as client messages, oldest first
    pub fn messages(&self) -> Vec<ClientMessage> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_slice(f).expect("router sent invalid JSON"))
            .collect()
    }

    /// Only the state snapshots, oldest first
    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn last_snapshot(&self) -> Option<StateSnapshot> {
        self.snapshots().pop()
    }

    /// Only the user counts, oldest first
    pub fn user_counts(&self) -> Vec<usize> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::UserCount { count } => Some(count),
                _ => None,
            })
            .collect()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    /// Mark the sender closed without going through `close`
    pub fn set_connected(&self, connected: bool) {
        self.closed.store(!connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportSender for RecordingSender {
    async fn send(&self, data: Bytes) -> ensemble_transport::Result<()> {
        self.try_send(data)
    }

    fn try_send(&self, data: Bytes) -> ensemble_transport::Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.frames.lock().push(data);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> ensemble_transport::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Emitter that keeps every routed message instead of sending it
#[derive(Clone, Default)]
pub struct RecordingEmitter {
    messages: Arc<Mutex<Vec<RoutedMessage>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<RoutedMessage> {
        self.messages.lock().clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.address.clone()).collect()
    }

    /// Messages emitted to one address, oldest first
    pub fn for_address(&self, address: &str) -> Vec<RoutedMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.address == address)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Emitter for RecordingEmitter {
    fn emit(&self, message: &RoutedMessage) {
        if self.is_open() {
            self.messages.lock().push(message.clone());
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// OSC Sink
// ============================================================================

/// UDP socket standing in for the OSC consumer
pub struct OscSink {
    socket: UdpSocket,
}

impl OscSink {
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { socket }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Emitter config pointing at this sink
    pub fn emitter_config(&self) -> OscEmitterConfig {
        OscEmitterConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            remote_host: "127.0.0.1".to_string(),
            remote_port: self.port(),
        }
    }

    /// Next OSC message, or None if nothing arrives in time
    pub async fn recv(&self, max_wait: Duration) -> Option<OscMessage> {
        let mut buf = vec![0u8; 65536];
        let (len, _) = timeout(max_wait, self.socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        match rosc::decoder::decode_udp(&buf[..len]) {
            Ok((_, OscPacket::Message(msg))) => Some(msg),
            _ => None,
        }
    }

    /// Collect exactly `n` messages, failing the test on timeout
    pub async fn expect(&self, n: usize) -> Vec<OscMessage> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.recv(DEFAULT_TIMEOUT).await {
                Some(msg) => out.push(msg),
                None => panic!("expected {} OSC messages, got {:?}", n, out),
            }
        }
        out
    }

    /// Assert that nothing arrives for a short while
    pub async fn expect_silence(&self) {
        if let Some(msg) = self.recv(QUIET_PERIOD).await {
            panic!("unexpected OSC message {:?}", msg);
        }
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// WebSocket client speaking the client envelope format
pub struct TestClient {
    sender: WebSocketSender,
    receiver: WebSocketReceiver,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (sender, receiver) = WebSocketTransport::connect(url)
            .await
            .expect("Failed to connect test client");
        Self { sender, receiver }
    }

    pub async fn send_json(&self, value: serde_json::Value) {
        self.send_raw(value.to_string()).await;
    }

    pub async fn send_raw(&self, text: impl Into<String>) {
        self.sender
            .send(Bytes::from(text.into()))
            .await
            .expect("Failed to send");
    }

    /// Send a data envelope
    pub async fn send_event(&self, address: &str, args: serde_json::Value) {
        self.send_json(serde_json::json!({ "address": address, "args": args }))
            .await;
    }

    /// Next pushed message, or None on timeout or disconnect
    pub async fn next_message(&mut self, max_wait: Duration) -> Option<ClientMessage> {
        loop {
            match timeout(max_wait, self.receiver.recv()).await.ok()?? {
                TransportEvent::Data(data) => {
                    return Some(serde_json::from_slice(&data).expect("router sent invalid JSON"))
                }
                TransportEvent::Connected => continue,
                _ => return None,
            }
        }
    }

    /// Skip user counts until the next snapshot
    pub async fn next_snapshot(&mut self) -> StateSnapshot {
        loop {
            match self.next_message(DEFAULT_TIMEOUT).await {
                Some(ClientMessage::State(s)) => return s,
                Some(ClientMessage::UserCount { .. }) => continue,
                None => panic!("no snapshot received"),
            }
        }
    }

    /// Skip snapshots until the next user count
    pub async fn next_user_count(&mut self) -> usize {
        loop {
            match self.next_message(DEFAULT_TIMEOUT).await {
                Some(ClientMessage::UserCount { count }) => return count,
                Some(ClientMessage::State(_)) => continue,
                None => panic!("no userCount received"),
            }
        }
    }

    /// Wait until the server closes the connection
    pub async fn wait_closed(&mut self, max_wait: Duration) -> bool {
        let closed = async {
            loop {
                match self.receiver.recv().await {
                    Some(TransportEvent::Disconnected { .. }) | None => return,
                    Some(_) => continue,
                }
            }
        };
        timeout(max_wait, closed).await.is_ok()
    }

    pub async fn close(&self) {
        let _ = self.sender.close().await;
    }
}

// ============================================================================
// Test Router - RAII wrapper with proper cleanup
// ============================================================================

/// A router on an ephemeral port, emitting to its own [`OscSink`]
pub struct TestRouter {
    port: u16,
    router: Router,
    sink: OscSink,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestRouter {
    /// Start a test router with default configuration
    pub async fn start() -> Self {
        Self::start_with_config(RouterConfig {
            name: "Test Router".to_string(),
            ..Default::default()
        })
        .await
    }

    /// Start a test router with custom configuration
    pub async fn start_with_config(config: RouterConfig) -> Self {
        let sink = OscSink::bind().await;
        let emitter = OscEmitter::bind(sink.emitter_config())
            .await
            .expect("Failed to bind emitter");
        let router = Router::new(config, Arc::new(emitter)).expect("Invalid router config");

        let server = WebSocketServer::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind WebSocket server");
        let port = server.local_addr().unwrap().port();

        let serving = router.clone();
        let handle = tokio::spawn(async move {
            let _ = serving.serve_on(server).await;
        });

        Self {
            port,
            router,
            sink,
            handle: Some(handle),
        }
    }

    /// Get the WebSocket URL for this router
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn sink(&self) -> &OscSink {
        &self.sink
    }

    /// Connect a client and consume its initial snapshot
    pub async fn connect_client(&self) -> (TestClient, StateSnapshot) {
        let mut client = TestClient::connect(&self.url()).await;
        let snapshot = client.next_snapshot().await;
        (client, snapshot)
    }

    /// Wait until the router reports `n` sessions
    pub async fn wait_for_sessions(&self, n: usize) -> bool {
        let router = &self.router;
        wait_for(
            || async move { router.session_count().await == n },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Stop the router gracefully
    pub async fn stop(&mut self) {
        self.router.stop().await;
        if let Some(handle) = self.handle.take() {
            let _ = timeout(DEFAULT_TIMEOUT, handle).await;
        }
    }
}

impl Drop for TestRouter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
