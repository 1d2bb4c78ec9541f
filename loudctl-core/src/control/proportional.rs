//! Proportional gain suggestion.
//!
//! Suggests a gain in percent: `base_gain` inside the band, plus the distance
//! outside the band scaled by `gain_per_unit`, capped at `±max_adjust`. The
//! suggestion is applied every tick, so the level keeps gliding toward it even
//! inside the band. The target itself is held inside the configured volume
//! bounds before the controller smooths toward it.

use super::AdjustmentPolicy;
use crate::calibration::ThresholdPair;

#[derive(Debug, Clone, Copy)]
pub struct ProportionalPolicy {
    base_gain: f32,
    gain_per_unit: f32,
    max_adjust: f32,
    min_level: f32,
    max_level: f32,
}

impl ProportionalPolicy {
    pub fn new(base_gain: f32, gain_per_unit: f32, max_adjust: f32) -> Self {
        Self {
            base_gain,
            gain_per_unit,
            max_adjust,
            min_level: 0.0,
            max_level: 1.0,
        }
    }

    /// Keep suggested levels inside `[min_level, max_level]`.
    pub fn with_bounds(mut self, min_level: f32, max_level: f32) -> Self {
        self.min_level = min_level.min(max_level);
        self.max_level = max_level.max(min_level);
        self
    }

    /// Suggested gain in percent for `noise` against `thresholds`.
    pub fn suggest_gain(&self, noise: f32, thresholds: ThresholdPair) -> f32 {
        let adj = if noise > thresholds.high {
            ((noise - thresholds.high) * self.gain_per_unit).min(self.max_adjust)
        } else if noise < thresholds.low {
            ((noise - thresholds.low) * self.gain_per_unit).max(-self.max_adjust)
        } else {
            0.0
        };
        self.base_gain + adj
    }
}

impl Default for ProportionalPolicy {
    fn default() -> Self {
        Self::new(50.0, 1.0, 30.0)
    }
}

impl AdjustmentPolicy for ProportionalPolicy {
    fn desired_level(&self, noise: f32, thresholds: ThresholdPair, _current: f32) -> Option<f32> {
        let level = self.suggest_gain(noise, thresholds) / 100.0;
        Some(level.clamp(self.min_level, self.max_level))
    }

    fn name(&self) -> &'static str {
        "proportional"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn band() -> ThresholdPair {
        ThresholdPair::new(50.0, 65.0)
    }

    #[test]
    fn inside_band_suggests_base_gain() {
        let policy = ProportionalPolicy::default();
        assert_eq!(policy.suggest_gain(57.0, band()), 50.0);
    }

    #[test]
    fn adjustment_scales_with_distance() {
        let policy = ProportionalPolicy::default();
        assert_abs_diff_eq!(policy.suggest_gain(75.0, band()), 60.0, epsilon = 1e-5);
        assert_abs_diff_eq!(policy.suggest_gain(40.0, band()), 40.0, epsilon = 1e-5);
    }

    #[test]
    fn adjustment_is_capped() {
        let policy = ProportionalPolicy::default();
        assert_eq!(policy.suggest_gain(100.0, band()), 80.0);
        assert_eq!(policy.suggest_gain(0.0, band()), 20.0);
    }

    #[test]
    fn desired_level_is_a_fraction() {
        let policy = ProportionalPolicy::default();
        assert_eq!(policy.desired_level(57.0, band(), 0.9), Some(0.5));
    }

    #[test]
    fn desired_level_respects_narrow_bounds() {
        let policy = ProportionalPolicy::default().with_bounds(0.3, 0.7);
        // Suggestions of 20% and 80% fall outside the bounds.
        assert_eq!(policy.desired_level(0.0, band(), 0.5), Some(0.3));
        assert_eq!(policy.desired_level(100.0, band(), 0.5), Some(0.7));
        assert_eq!(policy.desired_level(57.0, band(), 0.5), Some(0.5));
    }
}
