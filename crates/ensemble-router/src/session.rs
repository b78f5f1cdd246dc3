//! Session management

use ensemble_core::SessionId;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::zones::ZoneGrid;

/// Position a session starts at before it reports one
pub const CENTER: (f64, f64) = (0.5, 0.5);

/// Single axis of a position update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// A connected client session
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSession {
    /// Unique session ID, never reused within a process
    pub id: SessionId,
    /// Zone held in zones mode
    pub zone: Option<u32>,
    /// Last combined position reported via `/mouse/xy`
    pub last_position: (f64, f64),
    /// Session creation time
    pub created_at: Instant,
}

impl ClientSession {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            zone: None,
            last_position: CENTER,
            created_at: Instant::now(),
        }
    }
}

/// All live sessions plus the per-session positions averaged in blended mode.
///
/// Iteration is always in ascending id order.
#[derive(Debug)]
pub struct SessionRegistry {
    next_id: SessionId,
    sessions: BTreeMap<SessionId, ClientSession>,
    positions: BTreeMap<SessionId, (f64, f64)>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            sessions: BTreeMap::new(),
            positions: BTreeMap::new(),
        }
    }

    /// Allocate the next id and register a session for it
    pub fn add(&mut self) -> &ClientSession {
        let id = self.next_id;
        self.next_id += 1;

        self.positions.insert(id, CENTER);
        self.sessions.entry(id).or_insert_with(|| ClientSession::new(id))
    }

    /// Remove a session and its aggregate entry
    pub fn remove(&mut self, id: SessionId) -> Option<ClientSession> {
        self.positions.remove(&id);
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&ClientSession> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut ClientSession> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Sessions in ascending id order
    pub fn all(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.values()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Lowest live id
    pub fn first_id(&self) -> Option<SessionId> {
        self.sessions.keys().next().copied()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // =========================================================================
    // Zones
    // =========================================================================

    /// Zones held by every session except `except`
    pub fn held_zones(&self, except: SessionId) -> BTreeSet<u32> {
        self.sessions
            .values()
            .filter(|s| s.id != except)
            .filter_map(|s| s.zone)
            .collect()
    }

    /// Give one session a zone, preferring zones nobody holds
    pub fn assign_zone(&mut self, id: SessionId, grid: &ZoneGrid) -> Option<u32> {
        let held = self.held_zones(id);
        let session = self.sessions.get_mut(&id)?;
        let zone = grid.first_free(&held, id);
        session.zone = Some(zone);
        Some(zone)
    }

    /// Clear every zone, then assign again in ascending id order
    pub fn reassign_zones(&mut self, grid: &ZoneGrid) {
        for session in self.sessions.values_mut() {
            session.zone = None;
        }
        for id in self.ids() {
            self.assign_zone(id, grid);
        }
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// Record the last combined position of a session
    pub fn set_last_position(&mut self, id: SessionId, x: f64, y: f64) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.last_position = (x, y);
        }
    }

    /// Replace a session's aggregate entry
    pub fn update_position(&mut self, id: SessionId, x: f64, y: f64) {
        if self.sessions.contains_key(&id) {
            self.positions.insert(id, (x, y));
        }
    }

    /// Update one axis of a session's aggregate entry, keeping the other
    pub fn update_axis(&mut self, id: SessionId, axis: Axis, value: f64) {
        if !self.sessions.contains_key(&id) {
            return;
        }
        let entry = self.positions.entry(id).or_insert(CENTER);
        match axis {
            Axis::X => entry.0 = value,
            Axis::Y => entry.1 = value,
        }
    }

    /// Aggregate entry of one session
    pub fn position(&self, id: SessionId) -> Option<(f64, f64)> {
        self.positions.get(&id).copied()
    }

    /// Arithmetic mean of every aggregate entry
    pub fn mean_position(&self) -> Option<(f64, f64)> {
        if self.positions.is_empty() {
            return None;
        }
        let n = self.positions.len() as f64;
        let (sx, sy) = self
            .positions
            .values()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        Some((sx / n, sy / n))
    }

    pub fn aggregate_count(&self) -> usize {
        self.positions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
