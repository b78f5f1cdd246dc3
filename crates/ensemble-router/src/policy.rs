//! Routing policy
//!
//! Decides, per data event, which OSC messages leave the router. The mode
//! is global; every outbound list is produced synchronously from the
//! sender's event and the current registry.
//!
//! | Mode       | Output                                                       |
//! |------------|--------------------------------------------------------------|
//! | `separate` | `/user/{id}{address}`, then `/users/count [n]`               |
//! | `single`   | original message, then `/active/user [id]` (active only)     |
//! | `blended`  | mean `/mouse/x`, `/mouse/y`, `/mouse/xy`, `/users/count`     |
//! | `zones`    | `/zone/{z}{address}`, then `/zone/{z}/active [0/1]` on xy    |

use ensemble_core::address::{
    join, user_prefix, zone_prefix, ACTIVE_USER, MOUSE_X, MOUSE_XY, MOUSE_Y, USERS_COUNT,
};
use ensemble_core::{Arg, RoutedMessage, RoutingMode, SessionId};
use tracing::{debug, info, warn};

use crate::session::{Axis, SessionRegistry};
use crate::zones::ZoneGrid;

/// Global routing state: mode, active user and zone layout
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    mode: RoutingMode,
    active: Option<SessionId>,
    grid: ZoneGrid,
}

impl PolicyEngine {
    pub fn new(mode: RoutingMode, grid: ZoneGrid) -> Self {
        Self {
            mode,
            active: None,
            grid,
        }
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    pub fn active_user(&self) -> Option<SessionId> {
        self.active
    }

    pub fn grid(&self) -> &ZoneGrid {
        &self.grid
    }

    /// Whether a session's events are forwarded under the current mode
    pub fn is_active(&self, id: SessionId) -> bool {
        match self.mode {
            RoutingMode::Single => self.active == Some(id),
            _ => true,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Place a newly registered session
    pub fn on_session_added(&mut self, id: SessionId, registry: &mut SessionRegistry) {
        if self.mode == RoutingMode::Zones {
            if let Some(zone) = registry.assign_zone(id, &self.grid) {
                debug!("Session {} assigned zone {}", id, zone);
            }
        }
        self.ensure_active(registry);
    }

    /// Repair state after a session left the registry.
    ///
    /// Returns true when the active user changed.
    pub fn on_session_removed(&mut self, id: SessionId, registry: &SessionRegistry) -> bool {
        if self.active != Some(id) {
            return false;
        }
        self.active = registry.first_id();
        info!("Active user {} left, now {:?}", id, self.active);
        true
    }

    /// Switch the global mode.
    ///
    /// Entering `zones` from another mode reassigns every zone. Returns
    /// false when the mode was already in effect.
    pub fn set_mode(&mut self, mode: RoutingMode, registry: &mut SessionRegistry) -> bool {
        if mode == self.mode {
            debug!("Mode already {}", mode);
            return false;
        }

        let previous = self.mode;
        self.mode = mode;

        if mode == RoutingMode::Zones {
            registry.reassign_zones(&self.grid);
        }
        self.ensure_active(registry);

        info!("Routing mode {} -> {}", previous, mode);
        true
    }

    /// Grant the active role to `id`. Only honored in single mode.
    pub fn request_active(&mut self, id: SessionId, registry: &SessionRegistry) -> bool {
        if self.mode != RoutingMode::Single {
            debug!("Ignoring requestActive from {} in {} mode", id, self.mode);
            return false;
        }
        if !registry.contains(id) {
            return false;
        }
        if self.active != Some(id) {
            info!("Active user {:?} -> {}", self.active, id);
            self.active = Some(id);
        }
        true
    }

    fn ensure_active(&mut self, registry: &SessionRegistry) {
        let valid = self.active.map_or(false, |id| registry.contains(id));
        if !valid {
            self.active = registry.first_id();
        }
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Outbound messages for one data event from `sender`, in emit order
    pub fn route(
        &self,
        sender: SessionId,
        message: &RoutedMessage,
        registry: &mut SessionRegistry,
    ) -> Vec<RoutedMessage> {
        if !registry.contains(sender) {
            warn!("Data from unknown session {}", sender);
            return Vec::new();
        }

        if message.address == MOUSE_XY {
            if let Some((x, y)) = message.xy() {
                registry.set_last_position(sender, x, y);
            }
        }

        match self.mode {
            RoutingMode::Separate => route_separate(sender, message, registry),
            RoutingMode::Single => self.route_single(sender, message),
            RoutingMode::Blended => route_blended(sender, message, registry),
            RoutingMode::Zones => self.route_zones(sender, message, registry),
        }
    }

    fn route_single(&self, sender: SessionId, message: &RoutedMessage) -> Vec<RoutedMessage> {
        if self.active != Some(sender) {
            return Vec::new();
        }
        vec![
            message.clone(),
            RoutedMessage::new(ACTIVE_USER, vec![Arg::from(sender)]),
        ]
    }

    fn route_zones(
        &self,
        sender: SessionId,
        message: &RoutedMessage,
        registry: &SessionRegistry,
    ) -> Vec<RoutedMessage> {
        let Some(zone) = registry.get(sender).and_then(|s| s.zone) else {
            warn!("Session {} has no zone, dropping {}", sender, message.address);
            return Vec::new();
        };

        let prefix = zone_prefix(zone);
        let mut out = vec![RoutedMessage::new(
            join(&prefix, &message.address),
            message.args.clone(),
        )];

        if message.address == MOUSE_XY {
            if let Some((x, y)) = message.xy() {
                let inside = self.grid.classify(x, y) == zone;
                out.push(RoutedMessage::new(
                    join(&prefix, "/active"),
                    vec![Arg::Number(if inside { 1.0 } else { 0.0 })],
                ));
            }
        }
        out
    }
}

fn route_separate(
    sender: SessionId,
    message: &RoutedMessage,
    registry: &SessionRegistry,
) -> Vec<RoutedMessage> {
    vec![
        RoutedMessage::new(
            join(&user_prefix(sender), &message.address),
            message.args.clone(),
        ),
        RoutedMessage::new(USERS_COUNT, vec![Arg::from(registry.count())]),
    ]
}

fn route_blended(
    sender: SessionId,
    message: &RoutedMessage,
    registry: &mut SessionRegistry,
) -> Vec<RoutedMessage> {
    match message.address.as_str() {
        MOUSE_XY => match message.xy() {
            Some((x, y)) => registry.update_position(sender, x, y),
            None => return Vec::new(),
        },
        MOUSE_X => match message.first_number() {
            Some(x) => registry.update_axis(sender, Axis::X, x),
            None => return Vec::new(),
        },
        MOUSE_Y => match message.first_number() {
            Some(y) => registry.update_axis(sender, Axis::Y, y),
            None => return Vec::new(),
        },
        _ => return vec![message.clone()],
    }

    let Some((x, y)) = registry.mean_position() else {
        return Vec::new();
    };
    vec![
        RoutedMessage::new(MOUSE_X, vec![Arg::Number(x)]),
        RoutedMessage::new(MOUSE_Y, vec![Arg::Number(y)]),
        RoutedMessage::new(MOUSE_XY, vec![Arg::Number(x), Arg::Number(y)]),
        RoutedMessage::new(USERS_COUNT, vec![Arg::from(registry.aggregate_count())]),
    ]
}
