//! Terminal presentation of tick statuses.
//!
//! Two modes: a single status line rewritten in place, and a rolling meter
//! that shows the recent history of noise and output level as sparklines.

use std::collections::VecDeque;

use loudctl_core::TickStatus;

const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// `Noise: 42.3 | Low: 35.0 | High: 65.0 | Vol: 52%`
pub fn format_status_line(status: &TickStatus) -> String {
    format!(
        "Noise: {:>5.1} | Low: {:>5.1} | High: {:>5.1} | Vol: {:>3.0}%",
        status.noise,
        status.low_threshold,
        status.high_threshold,
        status.applied_level * 100.0
    )
}

/// Rolling history of the last `capacity` ticks.
#[derive(Debug, Clone)]
pub struct RollingMeter {
    noise: VecDeque<f32>,
    level: VecDeque<f32>,
    capacity: usize,
    last: Option<TickStatus>,
}

impl RollingMeter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            noise: VecDeque::with_capacity(capacity),
            level: VecDeque::with_capacity(capacity),
            capacity,
            last: None,
        }
    }

    pub fn push(&mut self, status: &TickStatus) {
        if self.noise.len() == self.capacity {
            self.noise.pop_front();
            self.level.pop_front();
        }
        self.noise.push_back(status.noise / 100.0);
        self.level.push_back(status.applied_level);
        self.last = Some(*status);
    }

    pub fn len(&self) -> usize {
        self.noise.len()
    }

    pub fn is_empty(&self) -> bool {
        self.noise.is_empty()
    }

    /// Three lines: noise sparkline, level sparkline, current numbers.
    pub fn render(&self) -> String {
        let Some(last) = self.last else {
            return "waiting for audio…".to_string();
        };
        format!(
            "noise {}\nlevel {}\n{}",
            sparkline(&self.noise),
            sparkline(&self.level),
            format_status_line(&last)
        )
    }
}

/// One glyph per value; values are fractions in `[0, 1]`.
fn sparkline(values: &VecDeque<f32>) -> String {
    values
        .iter()
        .map(|v| {
            let idx = (v.clamp(0.0, 1.0) * (SPARK.len() - 1) as f32).round() as usize;
            SPARK[idx]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(noise: f32, level: f32) -> TickStatus {
        TickStatus {
            seq: 0,
            timestamp_ms: 0,
            noise,
            low_threshold: 35.0,
            high_threshold: 65.0,
            applied_level: level,
            adjusted: false,
            recalibrated: false,
        }
    }

    #[test]
    fn status_line_shows_all_fields() {
        let line = format_status_line(&status(42.3, 0.516));
        assert_eq!(line, "Noise:  42.3 | Low:  35.0 | High:  65.0 | Vol:  52%");
    }

    #[test]
    fn meter_keeps_only_the_newest_entries() {
        let mut meter = RollingMeter::new(3);
        assert!(meter.is_empty());
        for i in 0..5 {
            meter.push(&status(i as f32 * 25.0, 0.5));
        }
        assert_eq!(meter.len(), 3);
        let rendered = meter.render();
        let first = rendered.lines().next().unwrap();
        // Noise 50, 75, 100 → middle, high, full.
        assert_eq!(first, "noise ▅▆█");
    }

    #[test]
    fn empty_meter_renders_placeholder() {
        assert_eq!(RollingMeter::new(100).render(), "waiting for audio…");
    }

    #[test]
    fn sparkline_clamps_out_of_range() {
        let values: VecDeque<f32> = vec![-1.0, 0.0, 2.0].into();
        assert_eq!(sparkline(&values), "▁▁█");
    }
}
