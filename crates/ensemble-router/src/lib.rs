//! Ensemble Router
//!
//! The router is the hub between browser clients and an OSC sink:
//! - Manages client sessions and their zones
//! - Applies the global routing mode to every gesture event
//! - Emits the results as OSC datagrams
//! - Pushes state snapshots and user counts back to clients
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
//!
//!     // WebSocket on the default port
//!     router.serve_websocket("0.0.0.0:8000").await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handler;
pub mod policy;
pub mod router;
pub mod session;
pub mod zones;

pub use error::{Result, RouterError};
pub use handler::{RouterCore, RouterStats};
pub use policy::PolicyEngine;
pub use router::{Router, RouterConfig};
pub use session::{Axis, ClientSession, SessionRegistry};
pub use zones::ZoneGrid;
