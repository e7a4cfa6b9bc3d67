// Port registry: the first service of a session.
//
// Maps logical stream names to the ports allocated at launch. Every other
// node blocks on it at startup, so the client side retries with a bounded
// wait against the registry not yet listening.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Request prefix of the discovery datagram protocol.
pub const GET_PORT: &str = "GET_PORT/";
/// Reply prefix for unknown stream names.
pub const NOT_FOUND: &str = "NOT_FOUND/";

const QUERY_ATTEMPTS: u32 = 40;
const QUERY_TIMEOUT: Duration = Duration::from_millis(250);

/// Request/response server over a fixed name->port table.
///
/// The table is populated once at construction and never changes, so
/// concurrent requests are served without locking.
pub struct PortRegistry {
    socket: UdpSocket,
    table: HashMap<String, u16>,
}

impl PortRegistry {
    /// Bind the registry on the agreed discovery port.
    pub async fn bind(host: &str, port: u16, table: HashMap<String, u16>) -> Result<Self> {
        let socket = UdpSocket::bind((host, port))
            .await
            .map_err(|e| Error::Resource(format!("cannot bind registry on {host}:{port}: {e}")))?;
        Ok(Self { socket, table })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve requests until cancelled, then release the socket.
    pub async fn serve(self, cancel: CancellationToken) {
        info!(
            streams = self.table.len(),
            "port registry serving {:?}",
            self.table.keys().collect::<Vec<_>>()
        );
        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("port registry stopped");
                    break;
                }

                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("registry receive error: {e}");
                            continue;
                        }
                    };
                    let request = String::from_utf8_lossy(&buf[..len]);
                    let reply = self.answer(request.trim());
                    debug!(%peer, %request, %reply, "registry request");
                    if let Err(e) = self.socket.send_to(reply.as_bytes(), peer).await {
                        warn!(%peer, "registry reply failed: {e}");
                    }
                }
            }
        }
    }

    fn answer(&self, request: &str) -> String {
        match request.strip_prefix(GET_PORT) {
            Some(name) => match self.table.get(name) {
                Some(port) => port.to_string(),
                None => format!("{NOT_FOUND}{name}"),
            },
            None => {
                warn!(%request, "malformed registry request");
                format!("{NOT_FOUND}{request}")
            }
        }
    }
}

/// One bounded-retry request/response exchange over a fresh UDP socket.
/// Shared by port and metadata queries.
pub(crate) async fn datagram_exchange(host: &str, port: u16, request: &str) -> Result<String> {
    let socket = UdpSocket::bind((host, 0)).await?;
    socket.connect((host, port)).await?;

    let mut buf = [0u8; 64 * 1024];
    for _ in 0..QUERY_ATTEMPTS {
        socket.send(request.as_bytes()).await?;
        match timeout(QUERY_TIMEOUT, socket.recv(&mut buf)).await {
            Ok(Ok(len)) => return Ok(String::from_utf8_lossy(&buf[..len]).into_owned()),
            // No listener yet (ICMP refusal) or lost datagram: retry.
            Ok(Err(e)) => {
                debug!("discovery receive error, retrying: {e}");
                tokio::time::sleep(QUERY_TIMEOUT).await;
            }
            Err(_elapsed) => {}
        }
    }
    Err(Error::Discovery(format!(
        "no response from {host}:{port} after {QUERY_ATTEMPTS} attempts"
    )))
}

/// Resolve one stream name to its port.
pub async fn query_port(host: &str, registry_port: u16, name: &str) -> Result<u16> {
    let reply = datagram_exchange(host, registry_port, &format!("{GET_PORT}{name}")).await?;
    if let Some(unknown) = reply.strip_prefix(NOT_FOUND) {
        return Err(Error::Discovery(format!(
            "registry does not know stream \"{unknown}\""
        )));
    }
    reply
        .trim()
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("registry reply is not a port: {reply:?}")))
}

/// Resolve a set of stream names, failing on the first unknown one.
pub async fn resolve_ports(
    host: &str,
    registry_port: u16,
    names: &[&str],
) -> Result<HashMap<String, u16>> {
    let mut ports = HashMap::with_capacity(names.len());
    for name in names {
        let port = query_port(host, registry_port, name).await?;
        ports.insert(name.to_string(), port);
    }
    Ok(ports)
}
