//! Server configuration.
//!
//! Values come from, in increasing priority:
//! - Built-in defaults
//! - TOML configuration file (`--config`)
//! - Command line flags

use anyhow::{Context, Result};
use ensemble_bridge::OscEmitterConfig;
use ensemble_core::{
    RoutingMode, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_OSC_BIND, DEFAULT_OSC_HOST, DEFAULT_OSC_PORT,
    DEFAULT_WS_PORT, DEFAULT_ZONE_COUNT,
};
use ensemble_router::{RouterConfig, ZoneGrid};
use serde::Deserialize;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Host the WebSocket listener binds to.
    pub ws_host: String,

    /// Port the WebSocket listener binds to.
    pub ws_port: u16,

    /// OSC sink host.
    pub osc_host: String,

    /// OSC sink port.
    pub osc_port: u16,

    /// Local address of the outbound OSC socket.
    pub osc_bind: String,

    /// Routing mode at startup.
    pub mode: RoutingMode,

    /// Number of zones; a perfect square.
    pub zones: u32,

    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_host: "0.0.0.0".to_string(),
            ws_port: DEFAULT_WS_PORT,
            osc_host: DEFAULT_OSC_HOST.to_string(),
            osc_port: DEFAULT_OSC_PORT,
            osc_bind: DEFAULT_OSC_BIND.to_string(),
            mode: RoutingMode::default(),
            zones: DEFAULT_ZONE_COUNT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Command line values that take precedence over the file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub ws_host: Option<String>,
    pub ws_port: Option<u16>,
    pub osc_host: Option<String>,
    pub osc_port: Option<u16>,
    pub osc_bind: Option<String>,
    pub mode: Option<RoutingMode>,
    pub zones: Option<u32>,
    pub max_message_size: Option<usize>,
}

impl Config {
    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply command line overrides
    pub fn merge(mut self, overrides: Overrides) -> Self {
        if let Some(v) = overrides.ws_host {
            self.ws_host = v;
        }
        if let Some(v) = overrides.ws_port {
            self.ws_port = v;
        }
        if let Some(v) = overrides.osc_host {
            self.osc_host = v;
        }
        if let Some(v) = overrides.osc_port {
            self.osc_port = v;
        }
        if let Some(v) = overrides.osc_bind {
            self.osc_bind = v;
        }
        if let Some(v) = overrides.mode {
            self.mode = v;
        }
        if let Some(v) = overrides.zones {
            self.zones = v;
        }
        if let Some(v) = overrides.max_message_size {
            self.max_message_size = v;
        }
        self
    }

    /// Reject values the router cannot start with
    pub fn validate(&self) -> Result<()> {
        ZoneGrid::new(self.zones)?;
        if self.max_message_size == 0 {
            anyhow::bail!("max_message_size must be greater than zero");
        }
        Ok(())
    }

    /// Address for the WebSocket listener.
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            name: "Ensemble Router".to_string(),
            initial_mode: self.mode,
            zone_count: self.zones,
            max_message_size: self.max_message_size,
            ..Default::default()
        }
    }

    pub fn emitter_config(&self) -> OscEmitterConfig {
        OscEmitterConfig {
            bind_addr: self.osc_bind.clone(),
            remote_host: self.osc_host.clone(),
            remote_port: self.osc_port,
        }
    }
}
