use std::time::Duration;

use thiserror::Error;

/// All errors produced by loudctl-core.
#[derive(Debug, Error)]
pub enum LoudctlError {
    /// Empty or malformed audio block. The tick is skipped.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Device read failure. Logged, the tick is skipped.
    #[error("capture error: {0}")]
    Capture(String),

    #[error("no audio block within {timeout:?}")]
    CaptureTimeout { timeout: Duration },

    /// Volume query/set failure. Logged, the previous level is kept.
    #[error("actuator error: {0}")]
    Actuator(String),

    /// Recalculation requested with an empty noise history.
    #[error("calibration unavailable: noise history is empty")]
    CalibrationUnavailable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("controller is already running")]
    AlreadyRunning,

    #[error("controller is not running")]
    NotRunning,

    /// `stop()` was called but the previous loop has not exited yet.
    #[error("previous control loop is still shutting down")]
    Stopping,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoudctlError {
    /// Per-tick errors that the loop logs and moves past.
    pub fn is_tick_local(&self) -> bool {
        matches!(
            self,
            LoudctlError::InvalidInput(_)
                | LoudctlError::Capture(_)
                | LoudctlError::CaptureTimeout { .. }
                | LoudctlError::Actuator(_)
                | LoudctlError::CalibrationUnavailable
        )
    }
}

pub type Result<T> = std::result::Result<T, LoudctlError>;
