//! Error types for Ensemble

use thiserror::Error;

/// Result type alias for Ensemble core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ensemble core error types
#[derive(Error, Debug)]
pub enum Error {
    /// JSON encoding error
    #[error("encode error: {0}")]
    EncodeError(String),

    /// JSON decoding error
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Envelope parsed as JSON but has the wrong shape
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Invalid address format
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Control envelope with an unrecognised `type`
    #[error("unknown control type: {0}")]
    UnknownControl(String),

    /// Mode name outside the known set
    #[error("unknown routing mode: {0}")]
    UnknownMode(String),

    /// Inbound frame exceeds the configured limit
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DecodeError(e.to_string())
    }
}
