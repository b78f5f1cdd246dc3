//! Protocol types and message definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Session identifier, assigned sequentially from 1
pub type SessionId = u64;

/// A single routed argument.
///
/// Numbers travel to the sink as OSC floats, everything else as OSC strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Number(f64),
    Text(String),
}

impl Arg {
    /// Numeric value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Number(n) => Some(*n),
            Arg::Text(_) => None,
        }
    }

    /// OSC type tag this argument is sent with
    pub fn type_tag(&self) -> char {
        match self {
            Arg::Number(_) => 'f',
            Arg::Text(_) => 's',
        }
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Arg::Number(n)
    }
}

impl From<f32> for Arg {
    fn from(n: f32) -> Self {
        Arg::Number(n as f64)
    }
}

impl From<u64> for Arg {
    fn from(n: u64) -> Self {
        Arg::Number(n as f64)
    }
}

impl From<u32> for Arg {
    fn from(n: u32) -> Self {
        Arg::Number(n as f64)
    }
}

impl From<usize> for Arg {
    fn from(n: usize) -> Self {
        Arg::Number(n as f64)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Number(n) => write!(f, "{:.3}", n),
            Arg::Text(s) => write!(f, "{}", s),
        }
    }
}

/// An event addressed to the sink: one OSC message worth of data.
///
/// Inbound data envelopes decode into this type as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedMessage {
    pub address: String,
    pub args: Vec<Arg>,
}

impl RoutedMessage {
    pub fn new(address: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// First two numeric arguments, as an (x, y) pair
    pub fn xy(&self) -> Option<(f64, f64)> {
        let x = self.args.first()?.as_f64()?;
        let y = self.args.get(1)?.as_f64()?;
        Some((x, y))
    }

    /// First argument as a number
    pub fn first_number(&self) -> Option<f64> {
        self.args.first()?.as_f64()
    }
}

/// Compact `address [a, b]` form used in routing logs
impl fmt::Display for RoutedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.address)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, "]")
    }
}

/// Collaboration policy applied to every data event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Every client routed under its own `/user/{id}` prefix
    #[default]
    Separate,
    /// Only the active client is forwarded
    Single,
    /// Positions of all clients averaged into one cursor
    Blended,
    /// Clients own cells of a grid over the unit square
    Zones,
}

impl RoutingMode {
    pub const ALL: [RoutingMode; 4] = [
        RoutingMode::Separate,
        RoutingMode::Single,
        RoutingMode::Blended,
        RoutingMode::Zones,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::Separate => "separate",
            RoutingMode::Single => "single",
            RoutingMode::Blended => "blended",
            RoutingMode::Zones => "zones",
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "separate" => Ok(RoutingMode::Separate),
            "single" => Ok(RoutingMode::Single),
            "blended" => Ok(RoutingMode::Blended),
            "zones" => Ok(RoutingMode::Zones),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

/// Control request from a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SetMode(RoutingMode),
    RequestActive,
}

/// A decoded client envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Data(RoutedMessage),
    Control(ControlMessage),
}

/// Per-client view of the router state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub user_id: SessionId,
    pub mode: RoutingMode,
    pub total_users: usize,
    pub zone: Option<u32>,
    pub is_active: bool,
}

/// Messages pushed from the router to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    State(StateSnapshot),
    UserCount { count: usize },
}
