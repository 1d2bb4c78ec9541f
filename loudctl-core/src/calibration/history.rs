//! Bounded loudness history with ring-buffer eviction.

use std::collections::VecDeque;

/// Most recent `capacity` loudness samples, oldest first.
#[derive(Debug, Clone)]
pub struct NoiseHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl NoiseHistory {
    /// `capacity` is raised to 1 if zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest sample when full.
    pub fn push(&mut self, sample: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Mean and population standard deviation, `None` when empty.
    pub fn mean_and_std(&self) -> Option<(f32, f32)> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f64;
        let mean = self.samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let var = self
            .samples
            .iter()
            .map(|&s| {
                let d = s as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        Some((mean as f32, var.sqrt() as f32))
    }
}
