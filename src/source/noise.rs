// Simulated acquisition source.
//
// Gaussian noise scaled to EEG-like microvolt magnitudes on the standard
// 16-channel montage, for development and tests without hardware.

use super::SignalSource;
use crate::error::Result;
use crate::types::{Chunk, SignalInfo};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const MONTAGE: [&str; 16] = [
    "FP1", "FP2", "F3", "Fz", "F4", "T7", "C3", "Cz", "C4", "T8", "P3", "Pz", "P4", "PO7", "PO8",
    "Oz",
];
const SAMPLE_RATE: f64 = 500.0;
const CHUNK_SIZE: usize = 20;
const SCALE: f32 = 1000.0;

pub struct NoiseSource {
    info: SignalInfo,
    rng: StdRng,
    normal: Normal<f32>,
}

impl NoiseSource {
    pub fn new() -> Self {
        Self {
            info: SignalInfo {
                sample_rate: SAMPLE_RATE,
                channels: MONTAGE.iter().map(|c| c.to_string()).collect(),
                chunk_size: CHUNK_SIZE,
                device: "simulated".to_string(),
            },
            rng: StdRng::from_os_rng(),
            normal: Normal::new(0.0, 1.0).expect("unit normal is valid"),
        }
    }
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for NoiseSource {
    fn info(&self) -> &SignalInfo {
        &self.info
    }

    fn next_chunk(&mut self) -> Result<Chunk> {
        let samples = self.info.chunk_size * self.info.num_channels();
        let data: Vec<f32> = (0..samples)
            .map(|_| self.normal.sample(&mut self.rng) * SCALE)
            .collect();
        Chunk::new(self.info.num_channels(), data)
    }
}
