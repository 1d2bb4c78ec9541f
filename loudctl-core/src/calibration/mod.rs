//! Rolling self-calibration of the comfortable loudness band.
//!
//! Loudness is recorded every tick, but thresholds are only recomputed every
//! `calc_interval`, from the mean ± one standard deviation of the whole
//! history window.
//!
//! An empty history never produces thresholds: the recalculation is skipped,
//! the configured defaults stay in force and the interval clock is left alone
//! so the next tick retries.

pub mod history;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::ControlConfig,
    error::{LoudctlError, Result},
};

pub use history::NoiseHistory;

/// Adaptive comfortable band, in loudness units. `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub low: f32,
    pub high: f32,
}

impl ThresholdPair {
    pub fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    pub fn is_ordered(&self) -> bool {
        self.low <= self.high
    }

    /// Same pair with `low` and `high` swapped if they are out of order.
    pub fn ordered(self) -> Self {
        if self.is_ordered() {
            self
        } else {
            Self {
                low: self.high,
                high: self.low,
            }
        }
    }
}

/// Owns the noise history and the thresholds derived from it.
#[derive(Debug, Clone)]
pub struct RollingCalibrator {
    history: NoiseHistory,
    thresholds: ThresholdPair,
    floor: f32,
    ceiling: f32,
    calc_interval: Duration,
    last_recalc: Instant,
}

impl RollingCalibrator {
    /// Start with an empty history and the configured default thresholds.
    /// `now` is taken as the time of the last recalculation.
    pub fn new(config: &ControlConfig, now: Instant) -> Self {
        Self {
            history: NoiseHistory::new(config.history_capacity()),
            thresholds: config.default_thresholds,
            floor: config.threshold_floor,
            ceiling: config.threshold_ceiling,
            calc_interval: config.calc_interval,
            last_recalc: now,
        }
    }

    /// Append one loudness sample.
    pub fn record(&mut self, sample: f32) {
        self.history.push(sample);
    }

    /// Recalculate if `calc_interval` has elapsed, returning the new pair.
    ///
    /// Returns `None` when not yet due, and also when due but the history is
    /// empty (thresholds unchanged in both cases).
    pub fn maybe_recalculate(&mut self, now: Instant) -> Option<ThresholdPair> {
        match self.try_recalculate(now) {
            Ok(pair) => pair,
            Err(e) => {
                debug!("threshold recalculation skipped: {e}");
                None
            }
        }
    }

    /// Like `maybe_recalculate`, but reports an empty history as
    /// `LoudctlError::CalibrationUnavailable`.
    pub fn try_recalculate(&mut self, now: Instant) -> Result<Option<ThresholdPair>> {
        if !self.is_due(now) {
            return Ok(None);
        }
        let (avg, std) = self
            .history
            .mean_and_std()
            .ok_or(LoudctlError::CalibrationUnavailable)?;

        let pair = ThresholdPair {
            low: (avg - std).clamp(self.floor, self.ceiling),
            high: (avg + std).clamp(self.floor, self.ceiling),
        };
        self.thresholds = pair;
        self.last_recalc = now;
        debug!(
            avg,
            std,
            low = pair.low,
            high = pair.high,
            samples = self.history.len(),
            "thresholds recalculated"
        );
        Ok(Some(pair))
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_recalc) >= self.calc_interval
    }

    /// Thresholds currently in force.
    pub fn thresholds(&self) -> ThresholdPair {
        self.thresholds
    }

    pub fn history(&self) -> &NoiseHistory {
        &self.history
    }

    pub fn last_recalc(&self) -> Instant {
        self.last_recalc
    }
}
