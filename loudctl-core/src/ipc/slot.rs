//! Single-slot holder for the most recent tick.
//!
//! The loop thread overwrites the slot once per tick; readers take a copy
//! whenever they like. Neither side waits on the other beyond a short
//! uncontended lock.

use std::sync::Arc;

use parking_lot::Mutex;

use super::events::TickStatus;

#[derive(Debug, Clone, Default)]
pub struct LatestStatus(Arc<Mutex<Option<TickStatus>>>);

impl LatestStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: TickStatus) {
        *self.0.lock() = Some(status);
    }

    /// Copy of the last published tick, `None` before the first one.
    pub fn latest(&self) -> Option<TickStatus> {
        *self.0.lock()
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(seq: u64) -> TickStatus {
        TickStatus {
            seq,
            timestamp_ms: seq * 100,
            noise: 10.0,
            low_threshold: 35.0,
            high_threshold: 65.0,
            applied_level: 0.4,
            adjusted: true,
            recalibrated: false,
        }
    }

    #[test]
    fn keeps_only_the_newest_value() {
        let slot = LatestStatus::new();
        assert!(slot.latest().is_none());
        let writer = slot.clone();
        writer.publish(status(1));
        writer.publish(status(2));
        assert_eq!(slot.latest().map(|s| s.seq), Some(2));
        slot.clear();
        assert!(writer.latest().is_none());
    }
}
