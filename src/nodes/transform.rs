// Filter node: subscribes to the raw stream, applies its filter chain to
// every chunk and re-broadcasts the result on its own stream.
//
// The chain is reconfigured at runtime by control strings arriving from
// this node's own subscribers (`FILTERS/hp8/lp30`). Loss of the upstream
// connection is terminal: the node has no alternate source.

use crate::broadcast::{subscribe, BroadcastServer, ControlMessage};
use crate::codec::read_chunk;
use crate::error::Result;
use crate::filters::{Filter, FilterCommand};
use crate::metadata::query_info;
use crate::registry::resolve_ports;
use crate::types::{Chunk, SignalInfo, FILTERED_STREAM, INFO_STREAM, RAW_STREAM};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct TransformConfig {
    pub host: String,
    pub registry_port: u16,
}

/// Filter role. Lifecycle: `configure` (resolve ports, query metadata,
/// attach upstream, own the filtered broadcast) then `run` (relaying)
/// until cancelled or the upstream closes.
pub struct Transform {
    info: SignalInfo,
    server: BroadcastServer,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    upstream_rx: mpsc::Receiver<Chunk>,
    chain: Vec<Box<dyn Filter>>,
    cancel: CancellationToken,
}

impl Transform {
    pub async fn configure(config: TransformConfig, cancel: CancellationToken) -> Result<Self> {
        info!("filter configuring");
        let ports = resolve_ports(
            &config.host,
            config.registry_port,
            &[INFO_STREAM, RAW_STREAM, FILTERED_STREAM],
        )
        .await?;

        let info = query_info(&config.host, ports[INFO_STREAM]).await?;
        info!(
            channels = info.num_channels(),
            sample_rate = info.sample_rate,
            "filter received stream metadata"
        );

        let mut server = BroadcastServer::bind(
            "filter",
            &config.host,
            ports[FILTERED_STREAM],
            cancel.child_token(),
        )
        .await?;
        let control_rx = server.start()?;

        let upstream = subscribe(&config.host, ports[RAW_STREAM], "").await?;
        info!("filter connected to data source");

        // Upstream reader task: a dedicated task keeps frame reads intact
        // while `run` multiplexes chunks with control traffic.
        let (chunk_tx, upstream_rx) = mpsc::channel::<Chunk>(64);
        let channels = info.num_channels();
        let reader_cancel = cancel.child_token();
        tokio::spawn(async move {
            let mut upstream = upstream;
            loop {
                tokio::select! {
                    biased;

                    _ = reader_cancel.cancelled() => break,

                    received = read_chunk(&mut upstream, channels) => {
                        match received {
                            Ok(Some(chunk)) => {
                                if chunk_tx.send(chunk).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {
                                info!("upstream closed the raw stream");
                                break;
                            }
                            Err(e) => {
                                error!("raw stream read failed: {e}");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            info,
            server,
            control_rx,
            upstream_rx,
            chain: Vec::new(),
            cancel,
        })
    }

    fn handle_control(&mut self, msg: ControlMessage) {
        if msg.text.is_empty() {
            debug!("subscriber {} joined with a plain hello", msg.subscriber);
            return;
        }
        match FilterCommand::parse(&msg.text) {
            Ok(command) => {
                info!(
                    "subscriber {} set filters: hp={:?} lp={:?}",
                    msg.subscriber, command.high_pass, command.low_pass
                );
                self.chain = command.build_chain(self.info.sample_rate);
            }
            Err(e) => {
                warn!("ignoring bad control from subscriber {}: {e}", msg.subscriber);
            }
        }
    }

    /// Relay chunks until cancelled or the upstream is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("filter relaying");
        let mut chunks_relayed: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                msg = self.control_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_control(msg),
                        None => break,
                    }
                }

                received = self.upstream_rx.recv() => {
                    match received {
                        Some(chunk) => {
                            let mut chunk = chunk;
                            for filter in &mut self.chain {
                                chunk = filter.apply(&chunk);
                            }
                            self.server.broadcast(&chunk).await;
                            chunks_relayed += 1;
                        }
                        None => {
                            // Upstream reader stopped; terminal for this node.
                            break;
                        }
                    }
                }
            }
        }

        self.server.close().await;
        info!("filter closed after relaying {chunks_relayed} chunks");
        Ok(())
    }
}
