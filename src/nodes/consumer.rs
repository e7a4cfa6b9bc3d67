// Visualizer ingestion node: subscribes to the filtered stream and keeps
// the last window of samples in a ring buffer for an external rendering
// collaborator to poll.
//
// The GUI itself is out of scope; `ViewHandle` is the capability it
// drives, decoupled from any toolkit's event loop: snapshot reads on one
// side, sideband control (re-tuning the upstream filters, toggling CAR)
// on the other.

use crate::broadcast::subscribe;
use crate::buffer::WindowBuffer;
use crate::codec::{read_chunk, write_frame};
use crate::error::Result;
use crate::filters::{apply_car, FilterCommand};
use crate::metadata::query_info;
use crate::registry::resolve_ports;
use crate::types::{SignalInfo, FILTERED_STREAM, INFO_STREAM};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct ConsumerConfig {
    pub host: String,
    pub registry_port: u16,
    /// Seconds of signal retained for display.
    pub window_secs: f64,
    pub apply_car: bool,
    /// Pre-broadcast filtering requested from the upstream filter node.
    pub filters: FilterCommand,
}

/// Capability handed to the rendering collaborator: window reads plus the
/// runtime controls a visualizer surfaces (filter cutoff entry, CAR
/// toggle).
#[derive(Clone)]
pub struct ViewHandle {
    info: SignalInfo,
    buffer: Arc<RwLock<WindowBuffer>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    car: Arc<AtomicBool>,
}

impl ViewHandle {
    pub fn info(&self) -> &SignalInfo {
        &self.info
    }

    /// Full window in chronological order, row-major
    /// `(window_len, channels)`.
    pub fn snapshot(&self) -> Vec<f32> {
        self.buffer.read().snapshot()
    }

    pub fn window_len(&self) -> usize {
        self.buffer.read().capacity()
    }

    /// Rows received so far, saturating at the window length.
    pub fn samples_buffered(&self) -> usize {
        self.buffer.read().len()
    }

    /// Send a new filter command over the live connection; the upstream
    /// filter node rebuilds its chain for all chunks that follow.
    pub async fn set_filters(&self, command: FilterCommand) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, command.encode().as_bytes()).await
    }

    /// Toggle common-average referencing for subsequent chunks.
    pub fn set_car(&self, enabled: bool) {
        self.car.store(enabled, Ordering::Relaxed);
    }
}

/// Visualizer ingestion role. Lifecycle: `configure` (resolve ports,
/// query metadata, subscribe with the preference hello) then `run`
/// (subscribing) until cancelled or the upstream closes.
pub struct Consumer {
    info: SignalInfo,
    reader: OwnedReadHalf,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    buffer: Arc<RwLock<WindowBuffer>>,
    car: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Consumer {
    pub async fn configure(config: ConsumerConfig, cancel: CancellationToken) -> Result<Self> {
        info!("visualizer ingestion configuring");
        let ports = resolve_ports(
            &config.host,
            config.registry_port,
            &[INFO_STREAM, FILTERED_STREAM],
        )
        .await?;

        let info = query_info(&config.host, ports[INFO_STREAM]).await?;
        info!(
            channels = info.num_channels(),
            sample_rate = info.sample_rate,
            "visualizer received stream metadata"
        );

        let hello = if config.filters.is_empty() {
            String::new()
        } else {
            config.filters.encode()
        };
        let stream = subscribe(&config.host, ports[FILTERED_STREAM], &hello).await?;
        info!("visualizer connected, waiting for data");
        // The read half ingests chunks; the write half stays open for
        // mid-stream filter commands from the view handle.
        let (reader, writer) = stream.into_split();

        let window = (info.sample_rate * config.window_secs).ceil() as usize;
        let buffer = Arc::new(RwLock::new(WindowBuffer::new(
            window.max(1),
            info.num_channels(),
        )));

        Ok(Self {
            info,
            reader,
            writer: Arc::new(Mutex::new(writer)),
            buffer,
            car: Arc::new(AtomicBool::new(config.apply_car)),
            cancel,
        })
    }

    pub fn view(&self) -> ViewHandle {
        ViewHandle {
            info: self.info.clone(),
            buffer: Arc::clone(&self.buffer),
            writer: Arc::clone(&self.writer),
            car: Arc::clone(&self.car),
        }
    }

    /// Ingest chunks into the window buffer until cancelled or the
    /// upstream closes. Upstream loss is terminal for this node.
    pub async fn run(mut self) -> Result<()> {
        let channels = self.info.num_channels();
        let mut samples_seen: u64 = 0;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break Ok(()),

                received = read_chunk(&mut self.reader, channels) => {
                    match received {
                        Ok(Some(mut chunk)) => {
                            if self.car.load(Ordering::Relaxed) {
                                apply_car(&mut chunk);
                            }
                            samples_seen += chunk.rows() as u64;
                            self.buffer.write().add(&chunk);
                        }
                        Ok(None) => {
                            info!("filtered stream closed");
                            break Ok(());
                        }
                        Err(e) => {
                            error!("filtered stream read failed: {e}");
                            break Err(e);
                        }
                    }
                }
            }
        };

        info!("visualizer ingestion closed after {samples_seen} samples");
        outcome
    }
}
