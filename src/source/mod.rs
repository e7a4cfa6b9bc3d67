// Pluggable acquisition sources.
//
// A `SignalSource` is the capability the producer node pulls chunks from;
// vendor device drivers live behind the same trait in external crates.
// New sources are added by implementing the trait, adding a
// `SourceConfig` variant and registering it in `create_source`.

mod noise;
mod playback;

use crate::error::{Error, Result};
use crate::types::{Chunk, SignalInfo};
use std::path::PathBuf;

pub use noise::NoiseSource;
pub use playback::PlaybackSource;

/// Capability presented by every acquisition backend.
pub trait SignalSource: Send {
    /// Acquisition parameters, fixed for the lifetime of the source.
    fn info(&self) -> &SignalInfo;

    /// Produce the next chunk of `info().chunk_size` samples. Pacing is
    /// the caller's job; sources only generate or read data.
    fn next_chunk(&mut self) -> Result<Chunk>;
}

/// Configuration for the available source types.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    /// Simulated acquisition: Gaussian noise on the standard montage.
    Noise,

    /// Looped playback of a pre-loaded waveform file.
    Playback {
        path: PathBuf,
        sample_rate: f64,
        chunk_size: usize,
    },
}

/// Resolve a device argument to a source configuration.
///
/// The order is fixed and every miss is explicit: the simulated-device
/// names match first, a `.csv` path second, and anything else is a
/// resource error naming the device — configuration mistakes are never
/// masked as "device absent".
pub fn parse_device(device: &str, sample_rate: f64, chunk_size: usize) -> Result<SourceConfig> {
    match device {
        "test" | "noise" => Ok(SourceConfig::Noise),
        d if d.ends_with(".csv") => Ok(SourceConfig::Playback {
            path: PathBuf::from(d),
            sample_rate,
            chunk_size,
        }),
        other => Err(Error::Resource(format!(
            "unknown device {other:?}; expected \"test\", \"noise\" or a .csv path"
        ))),
    }
}

/// Construct the source described by `config`.
pub fn create_source(config: SourceConfig) -> Result<Box<dyn SignalSource>> {
    match config {
        SourceConfig::Noise => Ok(Box::new(NoiseSource::new())),
        SourceConfig::Playback {
            path,
            sample_rate,
            chunk_size,
        } => Ok(Box::new(PlaybackSource::open(&path, sample_rate, chunk_size)?)),
    }
}
