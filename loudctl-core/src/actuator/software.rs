//! `SoftwareActuator`: in-process volume level.
//!
//! Used for dry runs, the simulator and tests. Clones share the same level,
//! so a caller can keep one clone to observe what the loop applied.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::actuator::VolumeActuator;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SoftwareActuator {
    level: Arc<Mutex<f32>>,
}

impl SoftwareActuator {
    pub fn new(initial: f32) -> Self {
        Self {
            level: Arc::new(Mutex::new(initial.clamp(0.0, 1.0))),
        }
    }

    /// Current level without going through the trait.
    pub fn level(&self) -> f32 {
        *self.level.lock()
    }
}

impl Default for SoftwareActuator {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl VolumeActuator for SoftwareActuator {
    fn get_current_level(&mut self) -> Result<f32> {
        Ok(*self.level.lock())
    }

    fn set_level(&mut self, level: f32) -> Result<()> {
        let level = level.clamp(0.0, 1.0);
        debug!(level, "software level set");
        *self.level.lock() = level;
        Ok(())
    }

    fn name(&self) -> &str {
        "software"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_level() {
        let observer = SoftwareActuator::new(0.3);
        let mut writer = observer.clone();
        writer.set_level(0.7).unwrap();
        assert_eq!(observer.level(), 0.7);
    }

    #[test]
    fn level_is_kept_in_unit_range() {
        let mut act = SoftwareActuator::new(4.0);
        assert_eq!(act.get_current_level().unwrap(), 1.0);
        act.set_level(-0.5).unwrap();
        assert_eq!(act.level(), 0.0);
    }
}
