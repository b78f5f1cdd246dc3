//! Router error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("session not found: {0}")]
    SessionNotFound(u64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid zone count {0}: must be a positive perfect square")]
    InvalidZoneCount(u32),

    #[error("router stopped")]
    Stopped,

    #[error("transport error: {0}")]
    Transport(#[from] ensemble_transport::TransportError),

    #[error("core protocol error: {0}")]
    Core(#[from] ensemble_core::Error),

    #[error("bridge error: {0}")]
    Bridge(#[from] ensemble_bridge::BridgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
