//! Loudness estimation: RMS → decibels → normalized loudness units.
//!
//! ## Algorithm
//!
//! 1. Compute RMS amplitude of the block.
//! 2. Convert to decibels: `20 * log10(rms + DB_EPSILON)`.
//! 3. Map `[db_floor, db_ceiling]` linearly onto `[LOUDNESS_MIN, LOUDNESS_MAX]`,
//!    clamping anything outside the input range.

use crate::{buffering::block::AudioBlock, config::ControlConfig, error::Result};

/// Guards `log10(0)` for digital silence.
pub const DB_EPSILON: f64 = 1e-7;

/// Loudness assigned to anything at or below `db_floor`.
pub const LOUDNESS_MIN: f32 = 0.0;

/// Loudness assigned to anything at or above `db_ceiling`.
pub const LOUDNESS_MAX: f32 = 100.0;

/// Stateless block → loudness converter.
#[derive(Debug, Clone, Copy)]
pub struct LoudnessEstimator {
    db_floor: f32,
    db_ceiling: f32,
}

impl LoudnessEstimator {
    /// # Parameters
    /// - `db_floor`: decibel value mapped to `LOUDNESS_MIN`. Default: -80.
    /// - `db_ceiling`: decibel value mapped to `LOUDNESS_MAX`. Default: -10.
    pub fn new(db_floor: f32, db_ceiling: f32) -> Self {
        Self {
            db_floor,
            db_ceiling,
        }
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Self::new(config.db_floor, config.db_ceiling)
    }

    /// Loudness of one block, in loudness units.
    ///
    /// # Errors
    /// `LoudctlError::InvalidInput` for an empty block or non-finite samples.
    pub fn estimate(&self, block: &AudioBlock) -> Result<f32> {
        block.validate()?;
        let db = amplitude_to_db(rms(&block.samples));
        Ok(self.map_db(db))
    }

    /// Linear decibel → loudness mapping with clamping at both ends.
    pub fn map_db(&self, db: f32) -> f32 {
        let span = self.db_ceiling - self.db_floor;
        if span <= 0.0 || !db.is_finite() {
            return LOUDNESS_MIN;
        }
        let t = ((db - self.db_floor) / span).clamp(0.0, 1.0);
        LOUDNESS_MIN + t * (LOUDNESS_MAX - LOUDNESS_MIN)
    }

    /// RMS amplitude whose estimate is `loudness`. Inverse of the mapping
    /// inside the open range; 0 at or below `LOUDNESS_MIN`.
    pub fn amplitude_for(&self, loudness: f32) -> f32 {
        if loudness <= LOUDNESS_MIN {
            return 0.0;
        }
        let t = ((loudness - LOUDNESS_MIN) / (LOUDNESS_MAX - LOUDNESS_MIN)).min(1.0);
        let db = self.db_floor + t * (self.db_ceiling - self.db_floor);
        10f32.powf(db / 20.0)
    }
}

impl Default for LoudnessEstimator {
    fn default() -> Self {
        Self::new(-80.0, -10.0)
    }
}

/// Root-mean-square of a sample slice (0 for an empty slice).
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// `20 * log10(amplitude + DB_EPSILON)`.
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    (20.0 * (amplitude.max(0.0) as f64 + DB_EPSILON).log10()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoudctlError;
    use approx::assert_abs_diff_eq;

    fn block(samples: Vec<f32>) -> AudioBlock {
        AudioBlock::new(samples, 44_100)
    }

    #[test]
    fn silence_maps_to_floor() {
        let est = LoudnessEstimator::default();
        let loudness = est.estimate(&block(vec![0.0; 2048])).unwrap();
        assert_eq!(loudness, LOUDNESS_MIN);
    }

    #[test]
    fn full_scale_clipping_maps_to_ceiling() {
        let est = LoudnessEstimator::default();
        let samples: Vec<f32> = (0..2048)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        assert_eq!(est.estimate(&block(samples)).unwrap(), LOUDNESS_MAX);
    }

    #[test]
    fn midpoint_of_db_range_maps_to_fifty() {
        let est = LoudnessEstimator::default();
        // -45 dB sits halfway between -80 and -10.
        let amplitude = 10f32.powf(-45.0 / 20.0);
        let loudness = est.estimate(&block(vec![amplitude; 1024])).unwrap();
        assert_abs_diff_eq!(loudness, 50.0, epsilon = 0.01);
    }

    #[test]
    fn minus_forty_db_maps_proportionally() {
        let est = LoudnessEstimator::default();
        let loudness = est.estimate(&block(vec![0.01; 512])).unwrap();
        assert_abs_diff_eq!(loudness, 40.0 / 70.0 * 100.0, epsilon = 0.01);
    }

    #[test]
    fn empty_block_is_invalid_input() {
        let est = LoudnessEstimator::default();
        assert!(matches!(
            est.estimate(&block(vec![])),
            Err(LoudctlError::InvalidInput(_))
        ));
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_abs_diff_eq!(rms(&samples), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn amplitude_for_inverts_the_mapping() {
        let est = LoudnessEstimator::default();
        for target in [10.0, 35.0, 65.0, 90.0] {
            let amp = est.amplitude_for(target);
            let loudness = est.estimate(&block(vec![amp; 256])).unwrap();
            assert_abs_diff_eq!(loudness, target, epsilon = 0.01);
        }
        assert_eq!(est.amplitude_for(0.0), 0.0);
    }

    #[test]
    fn custom_range_is_respected() {
        let est = LoudnessEstimator::new(-60.0, 0.0);
        assert_abs_diff_eq!(est.map_db(-30.0), 50.0, epsilon = 1e-4);
        assert_eq!(est.map_db(-90.0), LOUDNESS_MIN);
        assert_eq!(est.map_db(6.0), LOUDNESS_MAX);
    }
}
