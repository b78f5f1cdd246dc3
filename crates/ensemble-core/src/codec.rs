//! JSON envelope codec
//!
//! Clients exchange one JSON object per WebSocket frame.
//!
//! Inbound:
//! ```text
//! { "address": "/mouse/xy", "args": [0.5, 0.25] }
//! { "type": "setMode", "mode": "blended" }
//! { "type": "requestActive" }
//! ```
//!
//! Outbound frames are [`ClientMessage`] values.

use bytes::Bytes;
use serde::Deserialize;

use crate::types::*;
use crate::{address, Error, Result};

pub const SET_MODE: &str = "setMode";
pub const REQUEST_ACTIVE: &str = "requestActive";

/// Union of every accepted inbound shape
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    mode: Option<String>,
    address: Option<String>,
    args: Option<Vec<Arg>>,
}

/// Decode one inbound frame
pub fn decode(raw: &[u8]) -> Result<Inbound> {
    let envelope: RawEnvelope = serde_json::from_slice(raw)?;
    classify(envelope)
}

/// Decode one inbound text frame
pub fn decode_str(raw: &str) -> Result<Inbound> {
    decode(raw.as_bytes())
}

fn classify(envelope: RawEnvelope) -> Result<Inbound> {
    // A `type` field marks a control envelope even if `address` is also present
    if let Some(kind) = envelope.kind {
        return match kind.as_str() {
            SET_MODE => {
                let mode = envelope
                    .mode
                    .ok_or_else(|| Error::InvalidEnvelope("setMode without mode".to_string()))?;
                Ok(Inbound::Control(ControlMessage::SetMode(mode.parse()?)))
            }
            REQUEST_ACTIVE => Ok(Inbound::Control(ControlMessage::RequestActive)),
            _ => Err(Error::UnknownControl(kind)),
        };
    }

    let addr = envelope
        .address
        .ok_or_else(|| Error::InvalidEnvelope("missing address".to_string()))?;
    address::validate(&addr)?;

    let args = envelope
        .args
        .ok_or_else(|| Error::InvalidEnvelope(format!("missing args for {}", addr)))?;

    Ok(Inbound::Data(RoutedMessage::new(addr, args)))
}

/// Encode an outbound client message as a JSON text payload
pub fn encode(message: &ClientMessage) -> Result<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| Error::EncodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_takes_precedence() {
        let inbound =
            decode_str(r#"{"type":"requestActive","address":"/press","args":[1]}"#).unwrap();
        assert_eq!(inbound, Inbound::Control(ControlMessage::RequestActive));
    }

    #[test]
    fn test_empty_args_allowed() {
        let inbound = decode_str(r#"{"address":"/ping","args":[]}"#).unwrap();
        assert_eq!(inbound, Inbound::Data(RoutedMessage::new("/ping", vec![])));
    }
}
