//! Ensemble Outbound Bridges
//!
//! Turns routed messages into datagrams for an external consumer:
//! - OSC (Open Sound Control) over UDP, for TouchDesigner, Max/MSP and friends

pub mod error;
pub mod traits;

#[cfg(feature = "osc")]
pub mod osc;

pub use error::{BridgeError, Result};
pub use traits::Emitter;

#[cfg(feature = "osc")]
pub use osc::{OscEmitter, OscEmitterConfig};
