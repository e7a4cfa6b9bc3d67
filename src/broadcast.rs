// Generic N-subscriber fan-out server for chunk streams.
//
// Accepts any number of subscriber connections on a bound port and writes
// every broadcast chunk to all of them in submission order. Subscriber
// failures are isolated: a failed or timed-out write removes that
// subscriber only and never stops the producing loop. Frames sent by a
// subscriber (the connect-time hello and any later command) are forwarded
// to the owning node over a control channel; that is the only upstream
// signalling path.

use crate::codec::{encode_chunk, read_frame};
use crate::error::{Error, Result};
use crate::types::Chunk;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded slow-subscriber policy: a subscriber that cannot accept a
/// frame within this window is dropped instead of blocking the producer.
const SEND_TIMEOUT: Duration = Duration::from_secs(2);

const CONNECT_ATTEMPTS: u32 = 40;
const CONNECT_RETRY: Duration = Duration::from_millis(250);

/// Connect to a broadcast server as a subscriber, waiting (bounded) for
/// the peer to start listening, and send the connect-time control string
/// (empty for a plain subscription).
pub async fn subscribe(host: &str, port: u16, hello: &str) -> Result<TcpStream> {
    let mut last_error = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match TcpStream::connect((host, port)).await {
            Ok(mut stream) => {
                stream.write_all(&crate::codec::encode_control(hello)).await?;
                return Ok(stream);
            }
            Err(e) => {
                last_error = Some(e);
                tokio::time::sleep(CONNECT_RETRY).await;
            }
        }
    }
    Err(Error::Transport(format!(
        "cannot subscribe to {host}:{port}: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// A control string received from one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    pub subscriber: u64,
    pub text: String,
}

struct Subscriber {
    id: u64,
    peer: SocketAddr,
    writer: OwnedWriteHalf,
}

type SubscriberSet = Arc<Mutex<Vec<Subscriber>>>;

pub struct BroadcastServer {
    name: String,
    local_addr: SocketAddr,
    listener: Option<TcpListener>,
    subscribers: SubscriberSet,
    cancel: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl BroadcastServer {
    /// Bind the server; `cancel` scopes every task the server spawns.
    pub async fn bind(name: &str, host: &str, port: u16, cancel: CancellationToken) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            Error::Resource(format!("cannot bind {name} broadcast on {host}:{port}: {e}"))
        })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            name: name.to_string(),
            local_addr,
            listener: Some(listener),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            cancel,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the acceptor task. Returns the channel on which subscriber
    /// control strings arrive.
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<ControlMessage>> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Transport(format!("{} broadcast already started", self.name)))?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let name = self.name.clone();
        let subscribers = Arc::clone(&self.subscribers);
        let next_id = Arc::clone(&self.next_id);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            info!("{name} broadcast accepting on {}", listener.local_addr().map(|a| a.to_string()).unwrap_or_default());
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        info!("{name} broadcast acceptor stopped");
                        break;
                    }

                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(a) => a,
                            Err(e) => {
                                warn!("{name} accept error: {e}");
                                continue;
                            }
                        };
                        let id = next_id.fetch_add(1, Ordering::Relaxed);
                        let (read_half, write_half) = stream.into_split();
                        subscribers.lock().await.push(Subscriber {
                            id,
                            peer,
                            writer: write_half,
                        });
                        info!("{name} subscriber {id} joined from {peer}");

                        // Per-subscriber reader: forwards control frames
                        // upstream and prunes the entry on disconnect.
                        let name = name.clone();
                        let subscribers = Arc::clone(&subscribers);
                        let control_tx = control_tx.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            let mut read_half = read_half;
                            loop {
                                tokio::select! {
                                    biased;

                                    _ = cancel.cancelled() => break,

                                    frame = read_frame(&mut read_half) => {
                                        match frame {
                                            Ok(Some(payload)) => {
                                                match String::from_utf8(payload) {
                                                    Ok(text) => {
                                                        debug!("{name} control from subscriber {id}: {text:?}");
                                                        let _ = control_tx.send(ControlMessage {
                                                            subscriber: id,
                                                            text,
                                                        });
                                                    }
                                                    Err(_) => {
                                                        warn!("{name} subscriber {id} sent a non-UTF-8 control frame");
                                                    }
                                                }
                                            }
                                            Ok(None) => {
                                                info!("{name} subscriber {id} disconnected");
                                                break;
                                            }
                                            Err(e) => {
                                                warn!("{name} subscriber {id} control read error: {e}");
                                                break;
                                            }
                                        }
                                    }
                                }
                            }
                            subscribers.lock().await.retain(|s| s.id != id);
                        });
                    }
                }
            }
        });

        Ok(control_rx)
    }

    /// Encode `chunk` once and write it to every current subscriber.
    ///
    /// Returns the number of subscribers that received the chunk. Failed
    /// subscribers are pruned and logged; delivery to the rest proceeds.
    pub async fn broadcast(&self, chunk: &Chunk) -> usize {
        let frame = encode_chunk(chunk);
        let mut subscribers = self.subscribers.lock().await;
        let mut failed: Vec<u64> = Vec::new();

        for sub in subscribers.iter_mut() {
            match timeout(SEND_TIMEOUT, sub.writer.write_all(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        "{} dropping subscriber {} ({}): write failed: {e}",
                        self.name, sub.id, sub.peer
                    );
                    failed.push(sub.id);
                }
                Err(_elapsed) => {
                    warn!(
                        "{} dropping subscriber {} ({}): send timed out after {SEND_TIMEOUT:?}",
                        self.name, sub.id, sub.peer
                    );
                    failed.push(sub.id);
                }
            }
        }

        if !failed.is_empty() {
            subscribers.retain(|s| !failed.contains(&s.id));
        }
        subscribers.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Stop accepting, drop all subscriber connections and release the
    /// bound port. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut subscribers = self.subscribers.lock().await;
        if !subscribers.is_empty() {
            info!(
                "{} broadcast closing, dropping {} subscriber(s)",
                self.name,
                subscribers.len()
            );
        }
        subscribers.clear();
    }
}
