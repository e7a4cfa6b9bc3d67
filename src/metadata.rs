// Metadata publish/query: a one-shot dictionary of acquisition parameters.
//
// The producer publishes one immutable SignalInfo; every downstream node
// queries it before opening a data connection. Answers are independent,
// idempotent and side-effect-free.

use crate::error::{Error, Result};
use crate::registry::datagram_exchange;
use crate::types::SignalInfo;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Request text of the metadata protocol.
pub const GET_INFO: &str = "GET_INFO";

/// UDP server answering every `GET_INFO` datagram with the same
/// JSON-serialized record.
pub struct MetadataPublisher {
    socket: UdpSocket,
    payload: String,
}

impl MetadataPublisher {
    pub async fn bind(host: &str, port: u16, info: &SignalInfo) -> Result<Self> {
        info.validate()?;
        let socket = UdpSocket::bind((host, port)).await.map_err(|e| {
            Error::Resource(format!("cannot bind metadata publisher on {host}:{port}: {e}"))
        })?;
        let payload = serde_json::to_string(info)
            .map_err(|e| Error::Protocol(format!("cannot serialize metadata: {e}")))?;
        Ok(Self { socket, payload })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve queries until cancelled.
    pub async fn serve(self, cancel: CancellationToken) {
        info!("metadata publisher serving");
        let mut buf = [0u8; 256];
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("metadata publisher stopped");
                    break;
                }

                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("metadata receive error: {e}");
                            continue;
                        }
                    };
                    let request = String::from_utf8_lossy(&buf[..len]);
                    if request.trim() != GET_INFO {
                        warn!(%peer, %request, "unexpected metadata request");
                        continue;
                    }
                    debug!(%peer, "metadata query");
                    if let Err(e) = self.socket.send_to(self.payload.as_bytes(), peer).await {
                        warn!(%peer, "metadata reply failed: {e}");
                    }
                }
            }
        }
    }
}

/// Query the publisher at `host:port`, waiting (bounded) for it to come up.
///
/// A reply that does not parse and validate as a [`SignalInfo`] is a
/// protocol error; callers must treat that as fatal for their startup
/// rather than retry.
pub async fn query_info(host: &str, port: u16) -> Result<SignalInfo> {
    let reply = datagram_exchange(host, port, GET_INFO).await?;
    let info: SignalInfo = serde_json::from_str(&reply)
        .map_err(|e| Error::Protocol(format!("unparseable metadata payload: {e}")))?;
    info.validate()?;
    Ok(info)
}
