//! Bridge error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("bridge closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
