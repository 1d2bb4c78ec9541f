//! Fixed-step hysteresis around the adaptive band.
//!
//! ```text
//!   noise > high + margin  → current + step_up
//!   noise < low  - margin  → current - step_down
//!   otherwise              → no adjustment (dead zone)
//! ```

use super::AdjustmentPolicy;
use crate::{calibration::ThresholdPair, config::ControlConfig};

#[derive(Debug, Clone, Copy)]
pub struct HysteresisPolicy {
    /// Loudness units beyond a threshold before anything happens.
    margin: f32,
    step_up: f32,
    step_down: f32,
}

impl HysteresisPolicy {
    pub fn new(margin: f32, step_up: f32, step_down: f32) -> Self {
        Self {
            margin,
            step_up,
            step_down,
        }
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Self::new(config.stability_margin, config.step_up, config.step_down)
    }
}

impl Default for HysteresisPolicy {
    fn default() -> Self {
        Self::new(0.4, 0.08, 0.08)
    }
}

impl AdjustmentPolicy for HysteresisPolicy {
    fn desired_level(&self, noise: f32, thresholds: ThresholdPair, current: f32) -> Option<f32> {
        if noise > thresholds.high + self.margin {
            Some(current + self.step_up)
        } else if noise < thresholds.low - self.margin {
            Some(current - self.step_down)
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "hysteresis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn desired(policy: &HysteresisPolicy, noise: f32, band: ThresholdPair) -> Option<f32> {
        policy.desired_level(noise, band, 0.5)
    }

    #[test]
    fn margin_widens_the_dead_zone() {
        let policy = HysteresisPolicy::new(2.0, 0.1, 0.1);
        let band = ThresholdPair::new(40.0, 60.0);
        assert_eq!(desired(&policy, 61.9, band), None);
        assert_eq!(desired(&policy, 38.1, band), None);
        assert_abs_diff_eq!(desired(&policy, 62.1, band).unwrap(), 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(desired(&policy, 37.9, band).unwrap(), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn boundary_exactly_at_margin_is_dead_zone() {
        let policy = HysteresisPolicy::new(0.5, 0.08, 0.08);
        let band = ThresholdPair::new(30.0, 70.0);
        assert_eq!(desired(&policy, 70.5, band), None);
        assert_eq!(desired(&policy, 29.5, band), None);
    }

    #[test]
    fn asymmetric_steps() {
        let policy = HysteresisPolicy::new(0.0, 0.05, 0.2);
        let band = ThresholdPair::new(50.0, 50.0);
        assert_abs_diff_eq!(desired(&policy, 51.0, band).unwrap(), 0.55, epsilon = 1e-6);
        assert_abs_diff_eq!(desired(&policy, 49.0, band).unwrap(), 0.3, epsilon = 1e-6);
    }
}
