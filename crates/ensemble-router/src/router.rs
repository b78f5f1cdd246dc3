//! Main router implementation
//!
//! The router is transport-agnostic: it accepts connections from any
//! transport implementing [`TransportServer`]. Each connection gets a task
//! that forwards its frames to a single coordinator task, which owns the
//! [`RouterCore`] and applies events strictly one at a time.
//!
//! # Example
//!
//! ```no_run
//! use ensemble_bridge::{OscEmitter, OscEmitterConfig};
//! use ensemble_router::{Router, RouterConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let emitter = OscEmitter::bind(OscEmitterConfig::default()).await?;
//!     let router = Router::new(RouterConfig::default(), Arc::new(emitter))?;
//!     router.serve_websocket("0.0.0.0:8000").await?;
//!     Ok(())
//! }
//! ```

use bytes::Bytes;
use ensemble_bridge::Emitter;
use ensemble_core::{RoutingMode, SessionId, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_ZONE_COUNT};
use ensemble_transport::{TransportEvent, TransportReceiver, TransportSender, TransportServer};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

#[cfg(feature = "websocket")]
use ensemble_transport::WebSocketServer;

use crate::error::{Result, RouterError};
use crate::handler::{RouterCore, RouterStats};

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Server name, used in logs
    pub name: String,
    /// Mode in effect at startup
    pub initial_mode: RoutingMode,
    /// Number of zones; must be a perfect square
    pub zone_count: u32,
    /// Inbound frames larger than this are dropped
    pub max_message_size: usize,
    /// Capacity of the coordinator event queue
    pub event_queue: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "Ensemble Router".to_string(),
            initial_mode: RoutingMode::default(),
            zone_count: DEFAULT_ZONE_COUNT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            event_queue: 1024,
        }
    }
}

/// Everything the coordinator reacts to
enum RouterEvent {
    Connected {
        sender: Arc<dyn TransportSender>,
        addr: SocketAddr,
        reply: oneshot::Sender<SessionId>,
    },
    Message {
        id: SessionId,
        data: Bytes,
    },
    Closed {
        id: SessionId,
    },
    Stats {
        reply: oneshot::Sender<RouterStats>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Ensemble router
///
/// Cloning is cheap; clones drive the same coordinator.
#[derive(Clone)]
pub struct Router {
    config: RouterConfig,
    events: mpsc::Sender<RouterEvent>,
    running: Arc<RwLock<bool>>,
    shutdown: Arc<Notify>,
}

impl Router {
    /// Create the router and spawn its coordinator.
    ///
    /// Must be called from within a Tokio runtime. Fails on an invalid zone
    /// count.
    pub fn new(config: RouterConfig, emitter: Arc<dyn Emitter>) -> Result<Self> {
        let core = RouterCore::new(&config, emitter)?;
        let (events, rx) = mpsc::channel(config.event_queue.max(1));
        tokio::spawn(coordinate(core, rx));

        info!(
            "{} ready: {} mode, {} zones",
            config.name, config.initial_mode, config.zone_count
        );

        Ok(Self {
            config,
            events,
            running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // =========================================================================
    // Transport-Agnostic Methods
    // =========================================================================

    /// Serve using any TransportServer implementation.
    ///
    /// Returns once [`stop`](Self::stop) is called.
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        info!("Router accepting connections");
        *self.running.write() = true;

        while *self.running.read() {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = server.accept() => match accepted {
                    Ok((sender, receiver, addr)) => {
                        debug!("New connection from {}", addr);
                        self.handle_connection(Arc::new(sender), receiver, addr);
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
            }
        }

        info!("Router stopped accepting connections");
        Ok(())
    }

    // =========================================================================
    // WebSocket Transport
    // =========================================================================

    /// Bind a WebSocket listener on `addr` and serve it
    #[cfg(feature = "websocket")]
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let server = WebSocketServer::bind(addr).await?;
        self.serve_on(server).await
    }

    /// Alias for `serve_websocket`
    #[cfg(feature = "websocket")]
    pub async fn serve(&self, addr: &str) -> Result<()> {
        self.serve_websocket(addr).await
    }

    /// Handle a new connection
    fn handle_connection(
        &self,
        sender: Arc<dyn TransportSender>,
        mut receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
    ) {
        let events = self.events.clone();

        tokio::spawn(async move {
            let (reply, registered) = oneshot::channel();
            let connected = RouterEvent::Connected {
                sender: Arc::clone(&sender),
                addr,
                reply,
            };
            if events.send(connected).await.is_err() {
                let _ = sender.close().await;
                return;
            }
            let Ok(id) = registered.await else {
                let _ = sender.close().await;
                return;
            };

            loop {
                match receiver.recv().await {
                    Some(TransportEvent::Data(data)) => {
                        if events.send(RouterEvent::Message { id, data }).await.is_err() {
                            break;
                        }
                    }
                    Some(TransportEvent::Disconnected { reason }) => {
                        debug!("Client {} disconnected: {:?}", addr, reason);
                        break;
                    }
                    Some(TransportEvent::Error(e)) => {
                        warn!("Transport error from {}: {}", addr, e);
                        break;
                    }
                    Some(TransportEvent::Connected) => {}
                    None => break,
                }
            }

            let _ = events.send(RouterEvent::Closed { id }).await;
        });
    }

    /// Current mode, session count and active user
    pub async fn stats(&self) -> Result<RouterStats> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(RouterEvent::Stats { reply })
            .await
            .map_err(|_| RouterError::Stopped)?;
        rx.await.map_err(|_| RouterError::Stopped)
    }

    /// Get session count
    pub async fn session_count(&self) -> usize {
        self.stats().await.map(|s| s.sessions).unwrap_or(0)
    }

    /// Stop accepting, close every connection and the emitter.
    ///
    /// Safe to call more than once.
    pub async fn stop(&self) {
        *self.running.write() = false;
        self.shutdown.notify_one();

        let (done, finished) = oneshot::channel();
        if self.events.send(RouterEvent::Shutdown { done }).await.is_ok() {
            let _ = finished.await;
        }
    }
}

/// Coordinator loop: the only place router state is touched
async fn coordinate(mut core: RouterCore, mut events: mpsc::Receiver<RouterEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RouterEvent::Connected {
                sender,
                addr,
                reply,
            } => {
                let session = core.on_connect(sender);
                debug!("Session {} bound to {}", session.id, addr);
                if reply.send(session.id).is_err() {
                    core.on_close(session.id);
                }
            }
            RouterEvent::Message { id, data } => core.on_message(id, &data),
            RouterEvent::Closed { id } => core.on_close(id),
            RouterEvent::Stats { reply } => {
                let _ = reply.send(core.stats());
            }
            RouterEvent::Shutdown { done } => {
                for sender in core.shutdown() {
                    let _ = sender.close().await;
                }
                let _ = done.send(());
                break;
            }
        }
    }
    debug!("Coordinator exited");
}
