//! Gain control: loudness + thresholds + current level → next actuator level.
//!
//! The `AdjustmentPolicy` trait is the extensibility point: it only decides
//! *where* the level should head. `GainController` owns what every policy
//! shares: exponential smoothing toward that target and the final clamp to
//! `[min_volume, max_volume]`.

pub mod hysteresis;
pub mod proportional;

pub use hysteresis::HysteresisPolicy;
pub use proportional::ProportionalPolicy;

use tracing::warn;

use crate::{
    calibration::ThresholdPair,
    config::{ControlConfig, PolicyKind},
};

/// Decides the desired actuator level for one tick.
pub trait AdjustmentPolicy: Send + 'static {
    /// Desired level, or `None` to leave the actuator where it is.
    ///
    /// `thresholds` is always ordered and `current` always inside the
    /// configured volume bounds when the controller calls this.
    fn desired_level(&self, noise: f32, thresholds: ThresholdPair, current: f32) -> Option<f32>;

    /// Short identifier for logs and reports.
    fn name(&self) -> &'static str;
}

/// Outcome of one controller evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainDecision {
    /// Level to apply, already clamped.
    pub level: f32,
    /// Target the policy asked for, if any.
    pub desired: Option<f32>,
}

impl GainDecision {
    pub fn adjusted(&self) -> bool {
        self.desired.is_some()
    }
}

/// Smoothing + clamping wrapper around an `AdjustmentPolicy`.
pub struct GainController {
    policy: Box<dyn AdjustmentPolicy>,
    smoothing_factor: f32,
    min_volume: f32,
    max_volume: f32,
}

impl GainController {
    pub fn new(
        policy: Box<dyn AdjustmentPolicy>,
        smoothing_factor: f32,
        min_volume: f32,
        max_volume: f32,
    ) -> Self {
        Self {
            policy,
            smoothing_factor,
            min_volume,
            max_volume,
        }
    }

    /// Build the controller and the policy selected by `config.policy`.
    pub fn from_config(config: &ControlConfig) -> Self {
        let policy: Box<dyn AdjustmentPolicy> = match config.policy {
            PolicyKind::Hysteresis => Box::new(HysteresisPolicy::from_config(config)),
            PolicyKind::Proportional {
                base_gain,
                gain_per_unit,
                max_adjust,
            } => Box::new(
                ProportionalPolicy::new(base_gain, gain_per_unit, max_adjust)
                    .with_bounds(config.min_volume, config.max_volume),
            ),
        };
        Self::new(
            policy,
            config.smoothing_factor,
            config.min_volume,
            config.max_volume,
        )
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Next actuator level for this tick.
    pub fn compute_next_level(&self, noise: f32, thresholds: ThresholdPair, current: f32) -> f32 {
        self.evaluate(noise, thresholds, current).level
    }

    /// Like `compute_next_level`, also reporting whether the policy adjusted.
    pub fn evaluate(&self, noise: f32, thresholds: ThresholdPair, current: f32) -> GainDecision {
        let thresholds = if thresholds.is_ordered() {
            thresholds
        } else {
            warn!(
                low = thresholds.low,
                high = thresholds.high,
                "inverted threshold pair, swapping"
            );
            thresholds.ordered()
        };
        let current = self.clamp(current);

        if !noise.is_finite() {
            warn!("non-finite loudness, holding level");
            return GainDecision {
                level: current,
                desired: None,
            };
        }

        match self.policy.desired_level(noise, thresholds, current) {
            Some(desired) => {
                let smoothed = current + self.smoothing_factor * (desired - current);
                GainDecision {
                    level: self.clamp(smoothed),
                    desired: Some(desired),
                }
            }
            None => GainDecision {
                level: current,
                desired: None,
            },
        }
    }

    fn clamp(&self, level: f32) -> f32 {
        if !level.is_finite() {
            return self.min_volume;
        }
        level.clamp(self.min_volume, self.max_volume)
    }
}

impl std::fmt::Debug for GainController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GainController")
            .field("policy", &self.policy.name())
            .field("smoothing_factor", &self.smoothing_factor)
            .field("min_volume", &self.min_volume)
            .field("max_volume", &self.max_volume)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn controller() -> GainController {
        GainController::from_config(&ControlConfig::default())
    }

    fn band() -> ThresholdPair {
        ThresholdPair::new(35.0, 65.0)
    }

    #[test]
    fn dead_zone_returns_current_unchanged() {
        let ctl = controller();
        for noise in [34.7, 35.0, 50.0, 65.0, 65.3] {
            assert_eq!(ctl.compute_next_level(noise, band(), 0.5), 0.5, "noise={noise}");
        }
    }

    #[test]
    fn loud_noise_moves_a_smoothed_step_up() {
        let ctl = controller();
        let next = ctl.compute_next_level(80.0, band(), 0.5);
        // 0.5 + 0.2 * 0.08
        assert_abs_diff_eq!(next, 0.516, epsilon = 1e-6);
    }

    #[test]
    fn quiet_noise_moves_a_smoothed_step_down() {
        let ctl = controller();
        let next = ctl.compute_next_level(10.0, band(), 0.5);
        assert_abs_diff_eq!(next, 0.484, epsilon = 1e-6);
    }

    #[test]
    fn smoothing_never_overshoots_desired() {
        let ctl = controller();
        let current = 0.6;
        let decision = ctl.evaluate(90.0, band(), current);
        let desired = decision.desired.unwrap();
        assert!(decision.level > current && decision.level < desired);

        let decision = ctl.evaluate(1.0, band(), current);
        let desired = decision.desired.unwrap();
        assert!(decision.level < current && decision.level > desired);
    }

    #[test]
    fn output_is_always_clamped() {
        let ctl = controller();
        for noise in [0.0f32, 100.0, 1e9, -1e9] {
            for current in [-1.0f32, 0.0, 0.2, 0.5, 0.95, 1.0, 3.0] {
                let next = ctl.compute_next_level(noise, band(), current);
                assert!((0.2..=0.95).contains(&next), "noise={noise} current={current} next={next}");
            }
        }
    }

    #[test]
    fn out_of_range_current_in_dead_zone_is_clamped() {
        let ctl = controller();
        assert_eq!(ctl.compute_next_level(50.0, band(), 0.05), 0.2);
        assert_eq!(ctl.compute_next_level(50.0, band(), 1.0), 0.95);
    }

    #[test]
    fn inverted_thresholds_are_repaired_not_fatal() {
        let ctl = controller();
        let inverted = ThresholdPair::new(65.0, 35.0);
        assert_eq!(ctl.compute_next_level(50.0, inverted, 0.5), 0.5);
        assert!(ctl.compute_next_level(90.0, inverted, 0.5) > 0.5);
    }

    #[test]
    fn nan_noise_holds_level() {
        let ctl = controller();
        let decision = ctl.evaluate(f32::NAN, band(), 0.4);
        assert_eq!(decision.level, 0.4);
        assert!(!decision.adjusted());
    }

    #[test]
    fn sustained_loudness_approaches_but_never_exceeds_max() {
        let ctl = controller();
        let mut level = 0.5;
        let mut last_step = f32::INFINITY;
        for _ in 0..200 {
            let next = ctl.compute_next_level(90.0, band(), level);
            let step = next - level;
            assert!(step >= 0.0);
            assert!(step <= last_step + 1e-7);
            assert!(next <= 0.95);
            last_step = step;
            level = next;
        }
        assert_abs_diff_eq!(level, 0.95, epsilon = 1e-6);
    }

    #[test]
    fn proportional_policy_is_selectable() {
        let config = ControlConfig {
            policy: PolicyKind::proportional_default(),
            ..ControlConfig::default()
        };
        let ctl = GainController::from_config(&config);
        assert_eq!(ctl.policy_name(), "proportional");
        // Inside the band the proportional rule still pulls toward base gain.
        let next = ctl.compute_next_level(50.0, band(), 0.8);
        assert_abs_diff_eq!(next, 0.8 + 0.2 * (0.5 - 0.8), epsilon = 1e-6);
    }

    #[test]
    fn proportional_target_is_bounded_before_smoothing() {
        let config = ControlConfig {
            policy: PolicyKind::proportional_default(),
            min_volume: 0.3,
            ..ControlConfig::default()
        };
        let ctl = GainController::from_config(&config);
        let decision = ctl.evaluate(0.0, band(), 0.5);
        assert_eq!(decision.desired, Some(0.3));
        assert_abs_diff_eq!(decision.level, 0.5 + 0.2 * (0.3 - 0.5), epsilon = 1e-6);
    }
}
