// File-backed playback source.
//
// Loads a recorded waveform once and streams it chunk-by-chunk, wrapping
// to the start when exhausted (looped playback). The file is headered
// CSV: the first line names the channels, every following line is one
// sample row.

use super::SignalSource;
use crate::error::{Error, Result};
use crate::types::{Chunk, SignalInfo};
use std::path::Path;
use tracing::info;

pub struct PlaybackSource {
    info: SignalInfo,
    /// Row-major, `rows * channels` samples.
    signal: Vec<f32>,
    rows: usize,
    position: usize,
}

impl PlaybackSource {
    pub fn open(path: &Path, sample_rate: f64, chunk_size: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Resource(format!("cannot read {}: {e}", path.display())))?;
        let mut lines = content.lines();

        let header = lines
            .next()
            .ok_or_else(|| Error::Resource(format!("{} is empty", path.display())))?;
        let channels: Vec<String> = header
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if channels.is_empty() {
            return Err(Error::Resource(format!(
                "{} has no channel header",
                path.display()
            )));
        }

        let mut signal = Vec::new();
        let mut rows = 0usize;
        for (lineno, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let values: Vec<f32> = line
                .split(',')
                .map(|v| {
                    v.trim().parse::<f32>().map_err(|_| {
                        Error::Resource(format!(
                            "{} line {}: bad sample {v:?}",
                            path.display(),
                            lineno + 2
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            if values.len() != channels.len() {
                return Err(Error::Resource(format!(
                    "{} line {}: {} values for {} channels",
                    path.display(),
                    lineno + 2,
                    values.len(),
                    channels.len()
                )));
            }
            signal.extend(values);
            rows += 1;
        }

        if rows < chunk_size {
            return Err(Error::Resource(format!(
                "{} holds {rows} samples, fewer than one chunk of {chunk_size}",
                path.display()
            )));
        }

        let info = SignalInfo {
            sample_rate,
            channels,
            chunk_size,
            device: path.display().to_string(),
        };
        info.validate().map_err(|e| {
            Error::Resource(format!("invalid playback parameters for {}: {e}", path.display()))
        })?;

        info!(
            "loaded playback file {} ({} samples, {} channels)",
            path.display(),
            rows,
            info.num_channels()
        );

        Ok(Self {
            info,
            signal,
            rows,
            position: 0,
        })
    }
}

impl SignalSource for PlaybackSource {
    fn info(&self) -> &SignalInfo {
        &self.info
    }

    fn next_chunk(&mut self) -> Result<Chunk> {
        let channels = self.info.num_channels();
        if self.position + self.info.chunk_size > self.rows {
            info!("playback reached end of data, restarting from beginning");
            self.position = 0;
        }
        let start = self.position * channels;
        let end = (self.position + self.info.chunk_size) * channels;
        self.position += self.info.chunk_size;
        Chunk::new(channels, self.signal[start..end].to_vec())
    }
}
