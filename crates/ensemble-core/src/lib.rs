//! Ensemble Core
//!
//! Core types and encoding for the Ensemble multi-user gesture router.
//!
//! This crate provides:
//! - Routed event types ([`RoutedMessage`], [`Arg`])
//! - Routing modes ([`RoutingMode`])
//! - Client envelopes ([`Inbound`], [`ClientMessage`]) and their JSON [`codec`]
//! - Well-known addresses and prefix helpers ([`address`])

pub mod address;
pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use types::*;

/// Default WebSocket listen port
pub const DEFAULT_WS_PORT: u16 = 8000;

/// Default OSC sink host
pub const DEFAULT_OSC_HOST: &str = "127.0.0.1";

/// Default OSC sink port
pub const DEFAULT_OSC_PORT: u16 = 9000;

/// Default local address of the outbound OSC socket
pub const DEFAULT_OSC_BIND: &str = "0.0.0.0:57121";

/// Default number of zones (2x2 grid)
pub const DEFAULT_ZONE_COUNT: u32 = 4;

/// Default maximum inbound frame size
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;
