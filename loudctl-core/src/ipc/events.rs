//! Events broadcast by `ControlEngine`.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `TickStatus` | `ControlEngine::subscribe_ticks` |
//! | `EngineStatusEvent` | `ControlEngine::subscribe_status` |

use serde::{Deserialize, Serialize};

use crate::calibration::ThresholdPair;

// ---------------------------------------------------------------------------
// Per-tick status
// ---------------------------------------------------------------------------

/// One record per completed tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickStatus {
    /// Monotonically increasing tick sequence number.
    pub seq: u64,
    /// Milliseconds since the control loop started.
    pub timestamp_ms: u64,
    /// Loudness estimate for this tick, in loudness units.
    pub noise: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Level handed to the actuator, in `[min_volume, max_volume]`.
    pub applied_level: f32,
    /// Whether the policy asked for a change this tick.
    pub adjusted: bool,
    /// Whether the thresholds were recalculated this tick.
    pub recalibrated: bool,
}

impl TickStatus {
    pub fn thresholds(&self) -> ThresholdPair {
        ThresholdPair::new(self.low_threshold, self.high_threshold)
    }
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the engine changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Control loop lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created but `start()` not yet called.
    Idle,
    /// Capturing audio and driving the actuator.
    Running,
    /// Loop ended and stream released; the engine may be restarted.
    Stopped,
    /// Startup failed.
    Error,
}
