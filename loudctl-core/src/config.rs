//! Immutable controller configuration.
//!
//! Every tuning constant of the loop lives here and is handed to each
//! component at construction. Nothing is reconfigured at runtime.

use std::time::Duration;

use crate::{
    calibration::ThresholdPair,
    error::{LoudctlError, Result},
};

/// Which adjustment rule the `GainController` applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyKind {
    /// Dead zone around the adaptive band, fixed smoothed steps outside it.
    Hysteresis,
    /// Target level proportional to how far loudness sits outside the band.
    Proportional {
        /// Gain (percent) suggested while loudness is inside the band.
        base_gain: f32,
        /// Percent of gain per loudness unit outside the band.
        gain_per_unit: f32,
        /// Largest adjustment (percent) either side of `base_gain`.
        max_adjust: f32,
    },
}

impl PolicyKind {
    pub fn proportional_default() -> Self {
        PolicyKind::Proportional {
            base_gain: 50.0,
            gain_per_unit: 1.0,
            max_adjust: 30.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Hysteresis => "hysteresis",
            PolicyKind::Proportional { .. } => "proportional",
        }
    }
}

/// Configuration for `ControlEngine` and the components it drives.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Controller sample rate (Hz). Capture at other rates is resampled.
    /// Default: 44100.
    pub sample_rate: u32,
    /// Samples per audio block. Default: 2048.
    pub block_size: usize,
    /// Fraction of the gap to the desired level applied per adjustment.
    /// Default: 0.2.
    pub smoothing_factor: f32,
    /// Lowest level the actuator is ever driven to. Default: 0.2.
    pub min_volume: f32,
    /// Highest level the actuator is ever driven to. Default: 0.95.
    pub max_volume: f32,
    /// Wall-clock span of noise history used for calibration. Default: 40 s.
    pub rolling_window: Duration,
    /// Minimum time between threshold recalculations. Default: 4 s.
    pub calc_interval: Duration,
    /// Hysteresis margin around the thresholds (loudness units). Default: 0.4.
    pub stability_margin: f32,
    /// Increment toward which a loud tick pushes the level. Default: 0.08.
    pub step_up: f32,
    /// Decrement toward which a quiet tick pushes the level. Default: 0.08.
    pub step_down: f32,
    /// Thresholds in force until the first recalculation. Default: 35 / 65.
    pub default_thresholds: ThresholdPair,
    /// Lower bound for a calibrated low threshold. Default: 5.
    pub threshold_floor: f32,
    /// Upper bound for a calibrated high threshold. Default: 95.
    pub threshold_ceiling: f32,
    /// Decibel value mapped to loudness 0. Default: -80 dB.
    pub db_floor: f32,
    /// Decibel value mapped to loudness 100. Default: -10 dB.
    pub db_ceiling: f32,
    /// Pause between ticks. Default: 100 ms.
    pub tick_interval: Duration,
    /// Longest a tick waits for a full block. Default: 500 ms.
    pub read_timeout: Duration,
    /// Adjustment rule. Default: hysteresis.
    pub policy: PolicyKind,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 2_048,
            smoothing_factor: 0.2,
            min_volume: 0.2,
            max_volume: 0.95,
            rolling_window: Duration::from_secs(40),
            calc_interval: Duration::from_secs(4),
            stability_margin: 0.4,
            step_up: 0.08,
            step_down: 0.08,
            default_thresholds: ThresholdPair {
                low: 35.0,
                high: 65.0,
            },
            threshold_floor: 5.0,
            threshold_ceiling: 95.0,
            db_floor: -80.0,
            db_ceiling: -10.0,
            tick_interval: Duration::from_millis(100),
            read_timeout: Duration::from_millis(500),
            policy: PolicyKind::Hysteresis,
        }
    }
}

impl ControlConfig {
    /// Number of loudness samples covering `rolling_window` (at least one).
    pub fn history_capacity(&self) -> usize {
        if self.block_size == 0 {
            return 1;
        }
        let blocks =
            self.rolling_window.as_secs_f64() * self.sample_rate as f64 / self.block_size as f64;
        (blocks as usize).max(1)
    }

    /// Clamp a level into `[min_volume, max_volume]`. Non-finite input maps to `min_volume`.
    pub fn clamp_level(&self, level: f32) -> f32 {
        if !level.is_finite() {
            return self.min_volume;
        }
        level.clamp(self.min_volume, self.max_volume)
    }

    /// Check every cross-field invariant. Called once before the engine starts.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: impl Into<String>) -> Result<()> {
            Err(LoudctlError::InvalidConfig(msg.into()))
        }

        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive");
        }
        if self.block_size == 0 {
            return invalid("block_size must be positive");
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return invalid("smoothing_factor must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.min_volume) || !(0.0..=1.0).contains(&self.max_volume) {
            return invalid("volume bounds must lie in [0, 1]");
        }
        if self.min_volume > self.max_volume {
            return invalid("min_volume must not exceed max_volume");
        }
        if self.rolling_window.is_zero() {
            return invalid("rolling_window must be positive");
        }
        if !(self.stability_margin >= 0.0) {
            return invalid("stability_margin must be non-negative");
        }
        if !(self.step_up >= 0.0 && self.step_down >= 0.0) {
            return invalid("step sizes must be non-negative");
        }
        if self.threshold_floor > self.threshold_ceiling {
            return invalid("threshold_floor must not exceed threshold_ceiling");
        }
        let defaults = self.default_thresholds;
        if defaults.low > defaults.high
            || defaults.low < self.threshold_floor
            || defaults.high > self.threshold_ceiling
        {
            return invalid("default thresholds must be ordered and within the threshold bounds");
        }
        if !(self.db_floor < self.db_ceiling) {
            return invalid("db_floor must be below db_ceiling");
        }
        if self.read_timeout.is_zero() {
            return invalid("read_timeout must be positive");
        }
        if let PolicyKind::Proportional {
            gain_per_unit,
            max_adjust,
            ..
        } = self.policy
        {
            if !(gain_per_unit >= 0.0 && max_adjust >= 0.0) {
                return invalid("proportional policy parameters must be non-negative");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_history_capacity_covers_forty_seconds() {
        let config = ControlConfig::default();
        // 40 s * 44100 / 2048 = 861.3
        assert_eq!(config.history_capacity(), 861);
    }

    #[test]
    fn tiny_window_still_holds_one_sample() {
        let config = ControlConfig {
            rolling_window: Duration::from_millis(1),
            ..ControlConfig::default()
        };
        assert_eq!(config.history_capacity(), 1);
    }

    #[test]
    fn defaults_validate() {
        assert!(ControlConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_volume_bounds_are_rejected() {
        let config = ControlConfig {
            min_volume: 0.9,
            max_volume: 0.3,
            ..ControlConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LoudctlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn defaults_outside_bounds_are_rejected() {
        let config = ControlConfig {
            default_thresholds: ThresholdPair {
                low: 2.0,
                high: 65.0,
            },
            ..ControlConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamp_level_handles_nan() {
        let config = ControlConfig::default();
        assert_eq!(config.clamp_level(f32::NAN), config.min_volume);
        assert_eq!(config.clamp_level(2.0), config.max_volume);
        assert_eq!(config.clamp_level(0.5), 0.5);
    }
}
