// Common types shared across the pipeline.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logical stream name for the raw acquisition data broadcast.
pub const RAW_STREAM: &str = "EEGData";
/// Logical stream name for the filtered data broadcast.
pub const FILTERED_STREAM: &str = "FilteredData";
/// Logical stream name for the metadata publisher.
pub const INFO_STREAM: &str = "InfoDictionary";

/// Acquisition parameters published once by the producer and queried by
/// every downstream node before it opens a data connection.
///
/// The wire form is JSON; the field names match the keys the metadata
/// datagram has always carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    #[serde(rename = "SampleRate")]
    pub sample_rate: f64,

    /// Channel labels, in the column order every chunk uses.
    pub channels: Vec<String>,

    /// Samples per chunk.
    #[serde(rename = "dataChunkSize")]
    pub chunk_size: usize,

    /// Descriptive device label (e.g. "simulated", a file path).
    pub device: String,
}

impl SignalInfo {
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Wall-clock duration covered by one chunk.
    pub fn chunk_period(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate)
    }

    /// Validate a decoded record before trusting it.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0) {
            return Err(Error::Protocol(format!(
                "invalid sample rate: {}",
                self.sample_rate
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::Protocol("chunk size must be positive".into()));
        }
        if self.channels.is_empty() {
            return Err(Error::Protocol("channel list is empty".into()));
        }
        Ok(())
    }
}

/// One fixed-size block of multichannel samples, moved as a unit through
/// the pipeline.
///
/// Row-major `(rows, channels)` matrix of f32 samples; column order
/// matches [`SignalInfo::channels`]. The empty chunk (zero rows) is the
/// control/handshake chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    channels: usize,
    data: Vec<f32>,
}

impl Chunk {
    /// Build a chunk from row-major sample data.
    pub fn new(channels: usize, data: Vec<f32>) -> Result<Self> {
        if channels == 0 {
            return Err(Error::Protocol("chunk must have at least one channel".into()));
        }
        if data.len() % channels != 0 {
            return Err(Error::Protocol(format!(
                "chunk data length {} is not a multiple of {} channels",
                data.len(),
                channels
            )));
        }
        Ok(Self { channels, data })
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One sample row, all channels.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.channels..(i + 1) * self.channels]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}
