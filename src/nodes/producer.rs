// Acquisition node: pulls chunks from a signal source and broadcasts
// them on the raw data stream, publishing the session metadata alongside.

use crate::broadcast::BroadcastServer;
use crate::error::Result;
use crate::metadata::MetadataPublisher;
use crate::registry::resolve_ports;
use crate::source::{create_source, SignalSource, SourceConfig};
use crate::types::{SignalInfo, INFO_STREAM, RAW_STREAM};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ProducerConfig {
    pub host: String,
    pub registry_port: u16,
    pub source: SourceConfig,
}

/// Acquisition role. Lifecycle: `configure` (resolve ports, fix the
/// metadata, start the publisher and the raw broadcast) then `run`
/// (streaming) until cancelled.
pub struct Producer {
    info: SignalInfo,
    source: Box<dyn SignalSource>,
    server: BroadcastServer,
    cancel: CancellationToken,
    samples_streamed: u64,
}

impl Producer {
    pub async fn configure(config: ProducerConfig, cancel: CancellationToken) -> Result<Self> {
        info!("acquisition configuring");
        let ports = resolve_ports(
            &config.host,
            config.registry_port,
            &[INFO_STREAM, RAW_STREAM],
        )
        .await?;

        let source = create_source(config.source)?;
        let info = source.info().clone();
        info!(
            device = %info.device,
            channels = info.num_channels(),
            sample_rate = info.sample_rate,
            "acquisition source ready"
        );

        let publisher = MetadataPublisher::bind(&config.host, ports[INFO_STREAM], &info).await?;
        tokio::spawn(publisher.serve(cancel.child_token()));

        let mut server = BroadcastServer::bind(
            "acquisition",
            &config.host,
            ports[RAW_STREAM],
            cancel.child_token(),
        )
        .await?;
        let mut control_rx = server.start()?;
        // Raw subscribers send only the plain hello; drain and log it.
        tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                debug!("raw subscriber {} hello: {:?}", msg.subscriber, msg.text);
            }
        });

        Ok(Self {
            info,
            source,
            server,
            cancel,
            samples_streamed: 0,
        })
    }

    /// Stream chunks at the source's own pace until cancelled.
    ///
    /// An empty subscriber set is not a failure: streaming continues so
    /// future subscribers can join.
    pub async fn run(mut self) -> Result<()> {
        let period = self.info.chunk_period();
        info!("acquisition streaming, one chunk every {period:?}");
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break Ok(()),

                _ = tick.tick() => {
                    let chunk = match self.source.next_chunk() {
                        Ok(chunk) => chunk,
                        Err(e) => break Err(e),
                    };
                    self.samples_streamed += chunk.rows() as u64;
                    self.server.broadcast(&chunk).await;
                }
            }
        };

        self.server.close().await;
        info!(
            "acquisition finished streaming {} samples",
            self.samples_streamed
        );
        outcome
    }
}
