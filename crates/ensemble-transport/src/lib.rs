//! Ensemble Transport Layer
//!
//! This crate provides transport implementations for Ensemble:
//! - WebSocket (browser client connections)

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};

#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketConfig, WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport,
};
