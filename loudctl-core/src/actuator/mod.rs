//! Volume actuator abstraction.
//!
//! The `VolumeActuator` trait decouples the control loop from any specific
//! mixer API (in-process software level, PulseAudio/PipeWire via `pactl`, …).
//! Levels are linear fractions in `[0, 1]`; the loop clamps to the configured
//! `[min_volume, max_volume]` before every `set_level`.

pub mod pactl;
pub mod software;

pub use pactl::PactlActuator;
pub use software::SoftwareActuator;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Contract for output volume backends.
pub trait VolumeActuator: Send + 'static {
    /// Current output level in `[0, 1]`.
    ///
    /// # Errors
    /// `LoudctlError::Actuator` when the backend cannot be queried.
    fn get_current_level(&mut self) -> Result<f32>;

    /// Set the output level. `level` is already clamped by the caller.
    ///
    /// # Errors
    /// `LoudctlError::Actuator` when the backend rejects the change.
    fn set_level(&mut self, level: f32) -> Result<()>;

    /// Short backend identifier for logs.
    fn name(&self) -> &str;

    /// Startup check that the backend is reachable. Defaults to one read.
    fn probe(&mut self) -> Result<f32> {
        self.get_current_level()
    }
}

/// Thread-safe reference-counted handle to any `VolumeActuator` implementor.
///
/// The control loop thread is the only writer while running; the handle lets
/// the host read the level without owning the loop.
#[derive(Clone)]
pub struct ActuatorHandle(pub Arc<Mutex<dyn VolumeActuator>>);

impl ActuatorHandle {
    /// Wrap any `VolumeActuator` in an `ActuatorHandle`.
    pub fn new<A: VolumeActuator>(actuator: A) -> Self {
        Self(Arc::new(Mutex::new(actuator)))
    }

    pub fn name(&self) -> String {
        self.0.lock().name().to_string()
    }
}

impl std::fmt::Debug for ActuatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorHandle").finish_non_exhaustive()
    }
}
