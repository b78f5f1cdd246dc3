//! OSC (Open Sound Control) emitter

use ensemble_core::{Arg, RoutedMessage, DEFAULT_OSC_BIND, DEFAULT_OSC_HOST, DEFAULT_OSC_PORT};
use parking_lot::RwLock;
use rosc::{OscMessage, OscPacket, OscType};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::{BridgeError, Emitter, Result};

/// OSC emitter configuration
#[derive(Debug, Clone)]
pub struct OscEmitterConfig {
    /// Local address to bind the outbound socket to
    pub bind_addr: String,
    /// Sink host (name or IP)
    pub remote_host: String,
    /// Sink port
    pub remote_port: u16,
}

impl Default for OscEmitterConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_OSC_BIND.to_string(),
            remote_host: DEFAULT_OSC_HOST.to_string(),
            remote_port: DEFAULT_OSC_PORT,
        }
    }
}

/// Sends routed messages as OSC datagrams to one fixed sink
pub struct OscEmitter {
    socket: RwLock<Option<UdpSocket>>,
    remote: SocketAddr,
}

impl OscEmitter {
    /// Bind the outbound socket and resolve the sink address
    pub async fn bind(config: OscEmitterConfig) -> Result<Self> {
        let remote = resolve(&config.remote_host, config.remote_port).await?;
        let socket = UdpSocket::bind(&config.bind_addr)
            .await
            .map_err(|e| BridgeError::Bind(config.bind_addr.clone(), e))?;

        info!("OSC sending from {} to {}", socket.local_addr()?, remote);

        Ok(Self {
            socket: RwLock::new(Some(socket)),
            remote,
        })
    }

    /// The resolved sink address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Local address of the outbound socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.read();
        let socket = socket.as_ref().ok_or(BridgeError::Closed)?;
        Ok(socket.local_addr()?)
    }

    /// Send one datagram without waiting for socket readiness
    fn send(&self, message: &RoutedMessage) -> Result<()> {
        let bytes = encode(message)?;

        let socket = self.socket.read();
        let socket = socket.as_ref().ok_or(BridgeError::Closed)?;
        socket.try_send_to(&bytes, self.remote)?;
        Ok(())
    }
}

impl Emitter for OscEmitter {
    fn emit(&self, message: &RoutedMessage) {
        match self.send(message) {
            Ok(()) => debug!("{}", message),
            Err(BridgeError::Closed) => debug!("OSC emitter closed, dropped {}", message.address),
            Err(BridgeError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                debug!("OSC socket busy, dropped {}", message.address)
            }
            Err(e) => warn!("OSC send to {} failed: {}", self.remote, e),
        }
    }

    fn is_open(&self) -> bool {
        self.socket.read().is_some()
    }

    fn close(&self) {
        if self.socket.write().take().is_some() {
            info!("OSC emitter closed");
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{}:{}", host, port);
    let mut addrs = tokio::net::lookup_host(target.as_str())
        .await
        .map_err(|e| BridgeError::InvalidAddress(format!("{}: {}", target, e)))?;
    let first = addrs.next();
    first.ok_or_else(|| BridgeError::InvalidAddress(format!("{}: no addresses", target)))
}

/// Convert a routed argument to its OSC wire type
fn arg_to_osc(arg: &Arg) -> OscType {
    match arg {
        Arg::Number(n) => OscType::Float(*n as f32),
        Arg::Text(s) => OscType::String(s.clone()),
    }
}

/// Build the OSC packet for a routed message
pub fn to_packet(message: &RoutedMessage) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: message.address.clone(),
        args: message.args.iter().map(arg_to_osc).collect(),
    })
}

/// Encode a routed message as one OSC datagram
pub fn encode(message: &RoutedMessage) -> Result<Vec<u8>> {
    rosc::encoder::encode(&to_packet(message))
        .map_err(|e| BridgeError::Protocol(format!("OSC encode error: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_type_tags() {
        assert_eq!(arg_to_osc(&Arg::Number(0.75)), OscType::Float(0.75));
        assert_eq!(
            arg_to_osc(&Arg::Text("hi".into())),
            OscType::String("hi".into())
        );
    }

    #[test]
    fn test_encode_decodes_with_rosc() {
        let msg = RoutedMessage::new("/user/3/mouse/xy", vec![Arg::from(0.25), Arg::from(1.0)]);
        let bytes = encode(&msg).unwrap();

        match rosc::decoder::decode_udp(&bytes) {
            Ok((_, OscPacket::Message(m))) => {
                assert_eq!(m.addr, "/user/3/mouse/xy");
                assert_eq!(m.args, vec![OscType::Float(0.25), OscType::Float(1.0)]);
            }
            other => panic!("Expected OSC message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_sink_address() {
        let addr = resolve("127.0.0.1", 9000).await.unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());

        let addr = resolve("localhost", 9001).await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9001);

        assert!(matches!(
            resolve("no such host!", 9000).await,
            Err(BridgeError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_emitter_drops() {
        let emitter = OscEmitter::bind(OscEmitterConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            remote_host: "127.0.0.1".to_string(),
            remote_port: 9,
        })
        .await
        .unwrap();

        assert!(emitter.is_open());
        emitter.close();
        assert!(!emitter.is_open());
        assert!(matches!(
            emitter.send(&RoutedMessage::new("/press", vec![Arg::from(1.0)])),
            Err(BridgeError::Closed)
        ));

        // Never panics, never surfaces the failure
        emitter.emit(&RoutedMessage::new("/press", vec![Arg::from(1.0)]));
    }
}
