//! # loudctl-core
//!
//! Ambient-noise driven output volume controller.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → RingCapture (resample, newest block)
//!                                                    │
//!                                  ControlLoop (spawn_blocking, 100 ms ticks)
//!                                                    │
//!                    LoudnessEstimator → RollingCalibrator → GainController
//!                                                    │
//!                                         VolumeActuator::set_level
//!                                                    │
//!                         LatestStatus + broadcast::Sender<TickStatus>
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens on the loop thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod actuator;
pub mod audio;
pub mod buffering;
pub mod calibration;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod loudness;

// Convenience re-exports for downstream crates
pub use actuator::{ActuatorHandle, PactlActuator, SoftwareActuator, VolumeActuator};
pub use audio::device::{list_input_devices, DeviceInfo};
pub use audio::source::CaptureSource;
pub use buffering::block::AudioBlock;
pub use calibration::{RollingCalibrator, ThresholdPair};
pub use config::{ControlConfig, PolicyKind};
pub use control::{AdjustmentPolicy, GainController, HysteresisPolicy, ProportionalPolicy};
pub use engine::{control_loop::DiagnosticsSnapshot, ControlEngine};
pub use error::LoudctlError;
pub use ipc::events::{EngineStatus, EngineStatusEvent, TickStatus};
pub use loudness::LoudnessEstimator;
