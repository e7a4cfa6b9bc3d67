// Per-chunk filtering and the sideband filter-command grammar.
//
// A filter chain is an ordered sequence of stateful transforms applied to
// every chunk before re-broadcast. Subscribers request a chain with a
// short control string: `FILTERS` clears it, `FILTERS/hp8`,
// `FILTERS/hp8/lp30` set first-order high-/low-pass cutoffs in Hz.

use crate::error::{Error, Result};
use crate::types::Chunk;
use std::f32::consts::PI;

/// Command word of the sideband grammar.
pub const FILTERS: &str = "FILTERS";

/// A stateful transform over a chunk. State carries across chunks, so a
/// chain instance belongs to exactly one stream.
pub trait Filter: Send {
    fn apply(&mut self, chunk: &Chunk) -> Chunk;
}

/// Per-channel first-order IIR state.
#[derive(Clone, Copy, Default)]
struct BiState {
    prev_in: f32,
    prev_out: f32,
}

/// First-order high-pass: y[n] = a * (y[n-1] + x[n] - x[n-1]).
pub struct HighPass {
    alpha: f32,
    state: Vec<BiState>,
}

impl HighPass {
    pub fn new(cutoff_hz: f32, sample_rate: f64) -> Self {
        let dt = 1.0 / sample_rate as f32;
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        Self {
            alpha: rc / (rc + dt),
            state: Vec::new(),
        }
    }
}

impl Filter for HighPass {
    fn apply(&mut self, chunk: &Chunk) -> Chunk {
        let channels = chunk.channels();
        if self.state.len() != channels {
            self.state = vec![BiState::default(); channels];
        }
        let mut out = Vec::with_capacity(chunk.data().len());
        for row in 0..chunk.rows() {
            for (ch, &x) in chunk.row(row).iter().enumerate() {
                let s = &mut self.state[ch];
                let y = self.alpha * (s.prev_out + x - s.prev_in);
                s.prev_in = x;
                s.prev_out = y;
                out.push(y);
            }
        }
        Chunk::new(channels, out).expect("filter output keeps the input shape")
    }
}

/// First-order low-pass: y[n] = y[n-1] + a * (x[n] - y[n-1]).
pub struct LowPass {
    alpha: f32,
    state: Vec<f32>,
}

impl LowPass {
    pub fn new(cutoff_hz: f32, sample_rate: f64) -> Self {
        let dt = 1.0 / sample_rate as f32;
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        Self {
            alpha: dt / (rc + dt),
            state: Vec::new(),
        }
    }
}

impl Filter for LowPass {
    fn apply(&mut self, chunk: &Chunk) -> Chunk {
        let channels = chunk.channels();
        if self.state.len() != channels {
            self.state = vec![0.0; channels];
        }
        let mut out = Vec::with_capacity(chunk.data().len());
        for row in 0..chunk.rows() {
            for (ch, &x) in chunk.row(row).iter().enumerate() {
                let y = self.state[ch] + self.alpha * (x - self.state[ch]);
                self.state[ch] = y;
                out.push(y);
            }
        }
        Chunk::new(channels, out).expect("filter output keeps the input shape")
    }
}

/// Parsed form of a `FILTERS[/hp<f>][/lp<f>]` control string.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterCommand {
    pub high_pass: Option<f32>,
    pub low_pass: Option<f32>,
}

impl FilterCommand {
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = text.trim().split('/');
        if segments.next() != Some(FILTERS) {
            return Err(Error::Protocol(format!("not a filter command: {text:?}")));
        }

        let mut command = Self::default();
        for segment in segments {
            let (slot, value) = if let Some(v) = segment.strip_prefix("hp") {
                (&mut command.high_pass, v)
            } else if let Some(v) = segment.strip_prefix("lp") {
                (&mut command.low_pass, v)
            } else {
                return Err(Error::Protocol(format!(
                    "unknown filter segment {segment:?} in {text:?}"
                )));
            };
            let cutoff: f32 = value
                .parse()
                .map_err(|_| Error::Protocol(format!("bad cutoff {value:?} in {text:?}")))?;
            if !(cutoff > 0.0) {
                return Err(Error::Protocol(format!(
                    "cutoff must be positive in {text:?}"
                )));
            }
            *slot = Some(cutoff);
        }
        Ok(command)
    }

    /// Render back to the wire form.
    pub fn encode(&self) -> String {
        let mut text = String::from(FILTERS);
        if let Some(hp) = self.high_pass {
            text.push_str(&format!("/hp{hp}"));
        }
        if let Some(lp) = self.low_pass {
            text.push_str(&format!("/lp{lp}"));
        }
        text
    }

    /// Build a fresh filter chain, high-pass first.
    pub fn build_chain(&self, sample_rate: f64) -> Vec<Box<dyn Filter>> {
        let mut chain: Vec<Box<dyn Filter>> = Vec::new();
        if let Some(hp) = self.high_pass {
            chain.push(Box::new(HighPass::new(hp, sample_rate)));
        }
        if let Some(lp) = self.low_pass {
            chain.push(Box::new(LowPass::new(lp, sample_rate)));
        }
        chain
    }

    pub fn is_empty(&self) -> bool {
        self.high_pass.is_none() && self.low_pass.is_none()
    }
}

/// Common-average referencing: subtract the cross-channel mean from every
/// sample row, in place.
pub fn apply_car(chunk: &mut Chunk) {
    let channels = chunk.channels();
    if channels < 2 {
        return;
    }
    let data = chunk.data_mut();
    for row in data.chunks_exact_mut(channels) {
        let mean = row.iter().sum::<f32>() / channels as f32;
        for sample in row.iter_mut() {
            *sample -= mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_original_command_forms() {
        assert_eq!(FilterCommand::parse("FILTERS").unwrap(), FilterCommand::default());
        assert_eq!(
            FilterCommand::parse("FILTERS/hp8").unwrap(),
            FilterCommand {
                high_pass: Some(8.0),
                low_pass: None
            }
        );
        assert_eq!(
            FilterCommand::parse("FILTERS/hp8/lp30").unwrap(),
            FilterCommand {
                high_pass: Some(8.0),
                low_pass: Some(30.0)
            }
        );
        assert_eq!(
            FilterCommand::parse("FILTERS/lp30").unwrap(),
            FilterCommand {
                high_pass: None,
                low_pass: Some(30.0)
            }
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(FilterCommand::parse("NOISE").is_err());
        assert!(FilterCommand::parse("FILTERS/xp8").is_err());
        assert!(FilterCommand::parse("FILTERS/hpeight").is_err());
        assert!(FilterCommand::parse("FILTERS/hp-3").is_err());
    }

    #[test]
    fn encode_parse_is_stable() {
        let cmd = FilterCommand {
            high_pass: Some(8.0),
            low_pass: Some(30.0),
        };
        assert_eq!(FilterCommand::parse(&cmd.encode()).unwrap(), cmd);
        assert_eq!(FilterCommand::default().encode(), "FILTERS");
    }

    #[test]
    fn chain_order_is_hp_then_lp() {
        let cmd = FilterCommand::parse("FILTERS/hp1/lp40").unwrap();
        assert_eq!(cmd.build_chain(500.0).len(), 2);
        assert!(FilterCommand::default().build_chain(500.0).is_empty());
    }

    #[test]
    fn low_pass_converges_to_dc() {
        let mut lp = LowPass::new(10.0, 500.0);
        let step = Chunk::new(1, vec![1.0; 2000]).unwrap();
        let out = lp.apply(&step);
        let last = *out.data().last().unwrap();
        assert!((last - 1.0).abs() < 1e-3, "dc gain off: {last}");
    }

    #[test]
    fn high_pass_suppresses_dc() {
        let mut hp = HighPass::new(1.0, 500.0);
        let step = Chunk::new(1, vec![1.0; 5000]).unwrap();
        let out = hp.apply(&step);
        let last = *out.data().last().unwrap();
        assert!(last.abs() < 1e-2, "dc leak: {last}");
    }

    #[test]
    fn car_removes_the_row_mean() {
        let mut chunk = Chunk::new(2, vec![1.0, 3.0, -2.0, 2.0]).unwrap();
        apply_car(&mut chunk);
        assert_eq!(chunk.data(), &[-1.0, 1.0, -2.0, 2.0]);
        for row in 0..chunk.rows() {
            let sum: f32 = chunk.row(row).iter().sum();
            assert!(sum.abs() < 1e-6);
        }
    }
}
