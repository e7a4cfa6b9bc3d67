// Fixed-capacity windowing buffer for consumers.
//
// Single-writer single-reader ring store over the last W samples of a
// C-channel stream. Owned by the consuming node; never shared across
// processes.

use crate::types::Chunk;

pub struct WindowBuffer {
    capacity: usize,
    channels: usize,
    /// Row-major ring storage, `capacity * channels` long.
    data: Vec<f32>,
    /// Next row to write.
    head: usize,
    /// Rows written so far, saturating at `capacity`.
    filled: usize,
}

impl WindowBuffer {
    /// Create a buffer retaining `capacity` samples of `channels` channels.
    pub fn new(capacity: usize, channels: usize) -> Self {
        assert!(capacity > 0 && channels > 0);
        Self {
            capacity,
            channels,
            data: vec![0.0; capacity * channels],
            head: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Rows currently retained.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Append the chunk's rows, overwriting the oldest once full. A chunk
    /// larger than the window keeps only its most recent rows. Rows with a
    /// mismatched channel count are ignored.
    pub fn add(&mut self, chunk: &Chunk) {
        if chunk.channels() != self.channels {
            return;
        }
        let rows = chunk.rows();
        let skip = rows.saturating_sub(self.capacity);
        for i in skip..rows {
            let dest = self.head * self.channels;
            self.data[dest..dest + self.channels].copy_from_slice(chunk.row(i));
            self.head = (self.head + 1) % self.capacity;
            self.filled = (self.filled + 1).min(self.capacity);
        }
    }

    /// Current contents as a full `(capacity, channels)` row-major matrix
    /// in chronological order, zero-filled ahead of the first samples so
    /// the renderer's geometry is fixed from the first frame.
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.capacity * self.channels];
        for i in 0..self.filled {
            let src_row = (self.head + self.capacity - self.filled + i) % self.capacity;
            let dest_row = self.capacity - self.filled + i;
            let src = src_row * self.channels;
            let dest = dest_row * self.channels;
            out[dest..dest + self.channels]
                .copy_from_slice(&self.data[src..src + self.channels]);
        }
        out
    }
}
