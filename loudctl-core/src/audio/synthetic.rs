//! Scripted white-noise capture for the simulator and tests.
//!
//! A script is a list of segments, each holding a target loudness for a
//! number of blocks. Blocks are uniform white noise whose RMS lands on the
//! amplitude that maps to the requested loudness, so the estimator reads the
//! target back (within noise of the RNG). Seeded for reproducible runs.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    audio::source::CaptureSource,
    buffering::block::AudioBlock,
    error::{LoudctlError, Result},
    loudness::LoudnessEstimator,
};

/// `blocks` consecutive blocks at `loudness` (loudness units, 0–100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub blocks: usize,
    pub loudness: f32,
}

impl Segment {
    pub fn new(blocks: usize, loudness: f32) -> Self {
        Self { blocks, loudness }
    }
}

pub struct SyntheticCapture {
    script: Vec<Segment>,
    segment: usize,
    emitted_in_segment: usize,
    estimator: LoudnessEstimator,
    block_size: usize,
    sample_rate: u32,
    rng: StdRng,
}

impl SyntheticCapture {
    pub fn new(
        script: Vec<Segment>,
        estimator: LoudnessEstimator,
        block_size: usize,
        sample_rate: u32,
        seed: u64,
    ) -> Self {
        Self {
            script,
            segment: 0,
            emitted_in_segment: 0,
            estimator,
            block_size: block_size.max(1),
            sample_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Total number of blocks the script produces.
    pub fn total_blocks(&self) -> usize {
        self.script.iter().map(|s| s.blocks).sum()
    }

    fn noise_block(&mut self, rms: f32) -> AudioBlock {
        if rms <= 0.0 {
            return AudioBlock::constant(0.0, self.block_size, self.sample_rate);
        }
        // Uniform noise on [-a, a] has RMS a / sqrt(3).
        let peak = (rms * 3f32.sqrt()).min(1.0);
        let samples = (0..self.block_size)
            .map(|_| self.rng.gen_range(-peak..=peak))
            .collect();
        AudioBlock::new(samples, self.sample_rate)
    }
}

impl CaptureSource for SyntheticCapture {
    fn read_block(&mut self, _timeout: Duration) -> Result<AudioBlock> {
        while let Some(seg) = self.script.get(self.segment) {
            if self.emitted_in_segment < seg.blocks {
                self.emitted_in_segment += 1;
                let rms = self.estimator.amplitude_for(seg.loudness);
                return Ok(self.noise_block(rms));
            }
            self.segment += 1;
            self.emitted_in_segment = 0;
        }
        Err(LoudctlError::Capture("synthetic script exhausted".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_read_back_near_target_loudness() {
        let est = LoudnessEstimator::default();
        let mut cap = SyntheticCapture::new(vec![Segment::new(3, 50.0)], est, 2_048, 44_100, 7);
        for _ in 0..3 {
            let block = cap.read_block(Duration::ZERO).unwrap();
            assert_eq!(block.len(), 2_048);
            let loudness = est.estimate(&block).unwrap();
            assert!((loudness - 50.0).abs() < 1.0, "loudness={loudness}");
        }
    }

    #[test]
    fn walks_segments_then_reports_exhaustion() {
        let est = LoudnessEstimator::default();
        let script = vec![Segment::new(1, 0.0), Segment::new(0, 90.0), Segment::new(2, 90.0)];
        let mut cap = SyntheticCapture::new(script, est, 256, 44_100, 1);
        assert_eq!(cap.total_blocks(), 3);

        let silent = cap.read_block(Duration::ZERO).unwrap();
        assert_eq!(est.estimate(&silent).unwrap(), 0.0);
        for _ in 0..2 {
            let loud = cap.read_block(Duration::ZERO).unwrap();
            assert!(est.estimate(&loud).unwrap() > 85.0);
        }
        assert!(matches!(
            cap.read_block(Duration::ZERO),
            Err(LoudctlError::Capture(_))
        ));
    }
}
