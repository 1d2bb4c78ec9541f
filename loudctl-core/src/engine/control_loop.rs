//! Blocking control loop.
//!
//! ## Tick stages
//!
//! ```text
//! 1. TickSource gate (pacing + cancellation)
//! 2. CaptureSource::read_block (bounded wait)
//! 3. LoudnessEstimator::estimate
//! 4. RollingCalibrator::record, then maybe_recalculate
//! 5. VolumeActuator::get_current_level
//! 6. GainController::evaluate
//! 7. VolumeActuator::set_level (only when the level changes)
//! 8. Publish TickStatus (latest slot + broadcast)
//! ```
//!
//! Every failure is local to its tick. A bad block is rejected before it
//! reaches the history, and an actuator failure leaves the previous level in
//! place. Cancellation is only observed between ticks.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    actuator::{ActuatorHandle, VolumeActuator},
    audio::source::CaptureSource,
    buffering::block::AudioBlock,
    calibration::{RollingCalibrator, ThresholdPair},
    config::ControlConfig,
    control::GainController,
    engine::schedule::{Clock, TickSource},
    error::{LoudctlError, Result},
    ipc::{
        events::{EngineStatus, EngineStatusEvent, TickStatus},
        slot::LatestStatus,
    },
    loudness::LoudnessEstimator,
};

/// Consecutive identical failures are only logged at `warn` on the first
/// occurrence and then every this many ticks.
const REPEAT_WARN_EVERY: usize = 50;

#[derive(Default)]
pub struct LoopDiagnostics {
    pub ticks: AtomicUsize,
    pub invalid_blocks: AtomicUsize,
    pub capture_errors: AtomicUsize,
    pub actuator_errors: AtomicUsize,
    pub recalibrations: AtomicUsize,
    pub adjustments: AtomicUsize,
}

impl LoopDiagnostics {
    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.invalid_blocks.store(0, Ordering::Relaxed);
        self.capture_errors.store(0, Ordering::Relaxed);
        self.actuator_errors.store(0, Ordering::Relaxed);
        self.recalibrations.store(0, Ordering::Relaxed);
        self.adjustments.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            invalid_blocks: self.invalid_blocks.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            actuator_errors: self.actuator_errors.load(Ordering::Relaxed),
            recalibrations: self.recalibrations.load(Ordering::Relaxed),
            adjustments: self.adjustments.load(Ordering::Relaxed),
        }
    }

    fn record(&self, status: &TickStatus) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if status.recalibrated {
            self.recalibrations.fetch_add(1, Ordering::Relaxed);
        }
        if status.adjusted {
            self.adjustments.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub ticks: usize,
    pub invalid_blocks: usize,
    pub capture_errors: usize,
    pub actuator_errors: usize,
    pub recalibrations: usize,
    pub adjustments: usize,
}

/// Controller state carried across ticks: history, thresholds, last
/// recalculation time, plus the stateless estimator and policy.
#[derive(Debug)]
pub struct ControlLoop {
    config: ControlConfig,
    estimator: LoudnessEstimator,
    calibrator: RollingCalibrator,
    controller: GainController,
    started_at: Instant,
    seq: u64,
}

impl ControlLoop {
    /// Fresh state with default thresholds; `now` starts the recalculation clock.
    pub fn new(config: &ControlConfig, now: Instant) -> Self {
        Self {
            config: config.clone(),
            estimator: LoudnessEstimator::from_config(config),
            calibrator: RollingCalibrator::new(config, now),
            controller: GainController::from_config(config),
            started_at: now,
            seq: 0,
        }
    }

    pub fn thresholds(&self) -> ThresholdPair {
        self.calibrator.thresholds()
    }

    pub fn calibrator(&self) -> &RollingCalibrator {
        &self.calibrator
    }

    pub fn policy_name(&self) -> &'static str {
        self.controller.policy_name()
    }

    /// Run stages 3–7 for an already captured block.
    ///
    /// # Errors
    /// - `InvalidInput`: the block was rejected, nothing was recorded.
    /// - `Actuator`: the level could not be read or written; the loudness
    ///   sample is still recorded, the actuator keeps its previous level.
    pub fn process_block(
        &mut self,
        block: &AudioBlock,
        actuator: &mut dyn VolumeActuator,
        now: Instant,
    ) -> Result<TickStatus> {
        let noise = self.estimator.estimate(block)?;

        self.calibrator.record(noise);
        let recalibrated = self.calibrator.maybe_recalculate(now).is_some();
        let thresholds = self.calibrator.thresholds();

        let current = actuator.get_current_level()?;
        let decision = self.controller.evaluate(noise, thresholds, current);
        let level = self.config.clamp_level(decision.level);
        if level != current {
            actuator.set_level(level)?;
        }

        let status = TickStatus {
            seq: self.seq,
            timestamp_ms: elapsed_ms(now.saturating_duration_since(self.started_at)),
            noise,
            low_threshold: thresholds.low,
            high_threshold: thresholds.high,
            applied_level: level,
            adjusted: decision.adjusted(),
            recalibrated,
        };
        self.seq += 1;
        Ok(status)
    }
}

/// Milliseconds in `elapsed`, saturating at `u64::MAX`.
fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Everything the loop needs, passed as one struct so the closure stays tidy.
pub struct LoopContext {
    pub config: ControlConfig,
    pub source: Box<dyn CaptureSource>,
    pub actuator: ActuatorHandle,
    pub ticker: Box<dyn TickSource>,
    pub clock: Box<dyn Clock>,
    pub running: Arc<AtomicBool>,
    pub tick_tx: broadcast::Sender<TickStatus>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub latest: LatestStatus,
    pub diagnostics: Arc<LoopDiagnostics>,
}

/// Tracks runs of the same failure kind to keep logs readable.
#[derive(Default)]
struct FailureStreak {
    kind: Option<&'static str>,
    count: usize,
}

impl FailureStreak {
    fn report(&mut self, kind: &'static str, err: &LoudctlError) {
        if self.kind == Some(kind) {
            self.count += 1;
        } else {
            self.kind = Some(kind);
            self.count = 1;
        }
        if self.count == 1 || self.count % REPEAT_WARN_EVERY == 0 {
            warn!(kind, repeats = self.count, "tick skipped: {err}");
        } else {
            debug!(kind, repeats = self.count, "tick skipped: {err}");
        }
    }

    fn clear(&mut self) {
        if let Some(kind) = self.kind.take() {
            if self.count > 1 {
                info!(kind, repeats = self.count, "recovered after repeated failures");
            }
        }
        self.count = 0;
    }
}

/// Run ticks until the tick source says stop, then tear the source down.
///
/// Returns the final controller state for inspection.
pub fn run(mut ctx: LoopContext) -> ControlLoop {
    let mut control = ControlLoop::new(&ctx.config, ctx.clock.now());
    let mut streak = FailureStreak::default();

    info!(
        policy = control.policy_name(),
        history_capacity = control.calibrator().history().capacity(),
        tick_interval_ms = ctx.config.tick_interval.as_millis() as u64,
        "control loop started"
    );

    while ctx.ticker.next_tick(&ctx.running) {
        let block = match ctx.source.read_block(ctx.config.read_timeout) {
            Ok(block) => block,
            Err(e) => {
                ctx.diagnostics.capture_errors.fetch_add(1, Ordering::Relaxed);
                streak.report("capture", &e);
                continue;
            }
        };

        let now = ctx.clock.now();
        let outcome = {
            let mut actuator = ctx.actuator.0.lock();
            control.process_block(&block, &mut *actuator, now)
        };

        match outcome {
            Ok(status) => {
                streak.clear();
                ctx.diagnostics.record(&status);
                if status.recalibrated {
                    info!(
                        low = format_args!("{:.1}", status.low_threshold),
                        high = format_args!("{:.1}", status.high_threshold),
                        "thresholds recalibrated"
                    );
                }
                debug!(
                    seq = status.seq,
                    noise = format_args!("{:.1}", status.noise),
                    level = format_args!("{:.3}", status.applied_level),
                    adjusted = status.adjusted,
                    "tick"
                );
                ctx.latest.publish(status);
                let _ = ctx.tick_tx.send(status);
            }
            Err(e @ LoudctlError::InvalidInput(_)) => {
                ctx.diagnostics.invalid_blocks.fetch_add(1, Ordering::Relaxed);
                streak.report("invalid_input", &e);
            }
            Err(e @ LoudctlError::Actuator(_)) => {
                ctx.diagnostics.actuator_errors.fetch_add(1, Ordering::Relaxed);
                streak.report("actuator", &e);
            }
            Err(e) if e.is_tick_local() => streak.report("other", &e),
            Err(e) => error!("unexpected tick failure: {e}"),
        }
    }

    ctx.source.stop();

    {
        let mut status = ctx.status.lock();
        if *status == EngineStatus::Running {
            *status = EngineStatus::Stopped;
            let _ = ctx.status_tx.send(EngineStatusEvent {
                status: EngineStatus::Stopped,
                detail: None,
            });
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        ticks = snap.ticks,
        invalid_blocks = snap.invalid_blocks,
        capture_errors = snap.capture_errors,
        actuator_errors = snap.actuator_errors,
        recalibrations = snap.recalibrations,
        adjustments = snap.adjustments,
        "control loop stopped"
    );
    control
}
