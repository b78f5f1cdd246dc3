//! Connection handlers
//!
//! [`RouterCore`] owns every piece of mutable router state and is driven one
//! event at a time. All outbound delivery is non-blocking, so a handler never
//! yields between reading and writing state.

use bytes::Bytes;
use ensemble_bridge::Emitter;
use ensemble_core::{
    codec, ClientMessage, ControlMessage, Inbound, RoutedMessage, RoutingMode, SessionId,
    StateSnapshot,
};
use ensemble_transport::TransportSender;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, RouterError};
use crate::policy::PolicyEngine;
use crate::router::RouterConfig;
use crate::session::{ClientSession, SessionRegistry};
use crate::zones::ZoneGrid;

/// Point-in-time router summary
#[derive(Debug, Clone, PartialEq)]
pub struct RouterStats {
    pub mode: RoutingMode,
    pub sessions: usize,
    pub active_user: Option<SessionId>,
}

/// Router state plus the outbound channels it writes to
pub struct RouterCore {
    registry: SessionRegistry,
    policy: PolicyEngine,
    connections: BTreeMap<SessionId, Arc<dyn TransportSender>>,
    emitter: Arc<dyn Emitter>,
    max_message_size: usize,
}

impl RouterCore {
    /// Fails when the configured zone count is not a perfect square
    pub fn new(config: &RouterConfig, emitter: Arc<dyn Emitter>) -> Result<Self> {
        let grid = ZoneGrid::new(config.zone_count)?;
        Ok(Self {
            registry: SessionRegistry::new(),
            policy: PolicyEngine::new(config.initial_mode, grid),
            connections: BTreeMap::new(),
            emitter,
            max_message_size: config.max_message_size,
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn mode(&self) -> RoutingMode {
        self.policy.mode()
    }

    pub fn session_count(&self) -> usize {
        self.registry.count()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            mode: self.policy.mode(),
            sessions: self.registry.count(),
            active_user: self.policy.active_user(),
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Register a new connection.
    ///
    /// The client receives its own snapshot first, then every client gets
    /// the new user count.
    pub fn on_connect(&mut self, sender: Arc<dyn TransportSender>) -> ClientSession {
        let session = self.registry.add().clone();
        let id = session.id;
        self.connections.insert(id, sender);
        self.policy.on_session_added(id, &mut self.registry);

        info!(
            "Session {} connected ({} users, {} mode)",
            id,
            self.registry.count(),
            self.policy.mode()
        );

        self.send_snapshot(id);
        self.broadcast_user_count();

        self.registry.get(id).cloned().unwrap_or(session)
    }

    /// Handle one raw frame from a connection. Bad input is logged and dropped.
    pub fn on_message(&mut self, id: SessionId, raw: &[u8]) {
        if let Err(e) = self.handle_message(id, raw) {
            warn!("Dropped message from session {}: {}", id, e);
        }
    }

    /// Remove a connection and tell the remaining clients
    pub fn on_close(&mut self, id: SessionId) {
        self.connections.remove(&id);
        let Some(session) = self.registry.remove(id) else {
            return;
        };
        let active_changed = self.policy.on_session_removed(id, &self.registry);

        info!(
            "Session {} closed after {:.1}s ({} users left)",
            id,
            session.created_at.elapsed().as_secs_f64(),
            self.registry.count()
        );

        self.broadcast_user_count();
        if active_changed && self.policy.mode() == RoutingMode::Single {
            self.broadcast_snapshots();
        }
    }

    /// Close every session, then the emitter.
    ///
    /// Returns the senders so the caller can close them.
    pub fn shutdown(&mut self) -> Vec<Arc<dyn TransportSender>> {
        info!("Shutting down {} sessions", self.registry.count());
        let senders = self.connections.values().cloned().collect();
        for id in self.registry.ids() {
            self.on_close(id);
        }
        self.emitter.close();
        senders
    }

    fn handle_message(&mut self, id: SessionId, raw: &[u8]) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(RouterError::SessionNotFound(id));
        }
        if raw.len() > self.max_message_size {
            return Err(ensemble_core::Error::MessageTooLarge {
                size: raw.len(),
                max: self.max_message_size,
            }
            .into());
        }

        match codec::decode(raw)? {
            Inbound::Data(message) => self.route(id, &message),
            Inbound::Control(ControlMessage::SetMode(mode)) => {
                self.policy.set_mode(mode, &mut self.registry);
                self.broadcast_snapshots();
            }
            Inbound::Control(ControlMessage::RequestActive) => {
                if self.policy.request_active(id, &self.registry) {
                    self.broadcast_snapshots();
                }
            }
        }
        Ok(())
    }

    fn route(&mut self, id: SessionId, message: &RoutedMessage) {
        let outputs = self.policy.route(id, message, &mut self.registry);
        if outputs.is_empty() {
            debug!("Session {} {} produced no output", id, message.address);
        }
        for output in &outputs {
            self.emitter.emit(output);
        }
    }

    // =========================================================================
    // Client Notifications
    // =========================================================================

    /// Snapshot of router state as seen by one session
    pub fn snapshot_for(&self, id: SessionId) -> Option<StateSnapshot> {
        let session = self.registry.get(id)?;
        let zone = match self.policy.mode() {
            RoutingMode::Zones => session.zone,
            _ => None,
        };
        Some(StateSnapshot {
            user_id: id,
            mode: self.policy.mode(),
            total_users: self.registry.count(),
            zone,
            is_active: self.policy.is_active(id),
        })
    }

    /// Send one session its snapshot
    pub fn send_snapshot(&self, id: SessionId) {
        let Some(snapshot) = self.snapshot_for(id) else {
            return;
        };
        match codec::encode(&ClientMessage::State(snapshot)) {
            Ok(bytes) => self.send_to(id, bytes),
            Err(e) => warn!("Failed to encode snapshot for {}: {}", id, e),
        }
    }

    /// Send every session its own snapshot
    pub fn broadcast_snapshots(&self) {
        for id in self.connections.keys() {
            self.send_snapshot(*id);
        }
    }

    fn broadcast_user_count(&self) {
        self.broadcast(&ClientMessage::UserCount {
            count: self.registry.count(),
        });
    }

    /// Send the same message to every connection that is still open
    pub fn broadcast(&self, message: &ClientMessage) {
        let bytes = match codec::encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return;
            }
        };
        for id in self.connections.keys() {
            self.send_to(*id, bytes.clone());
        }
    }

    fn send_to(&self, id: SessionId, bytes: Bytes) {
        let Some(sender) = self.connections.get(&id) else {
            return;
        };
        if !sender.is_connected() {
            debug!("Skipping closed connection {}", id);
            return;
        }
        if let Err(e) = sender.try_send(bytes) {
            debug!("Send to session {} failed: {}", id, e);
        }
    }
}
