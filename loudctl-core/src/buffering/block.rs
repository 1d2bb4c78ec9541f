//! Fixed-length audio block handed from the capture source to the estimator.

use crate::error::{LoudctlError, Result};

/// A contiguous block of mono PCM samples at the controller's sample rate.
///
/// Produced and consumed within a single tick; never retained.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (fixed for the process lifetime).
    pub sample_rate: u32,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Block of `len` samples at a constant amplitude.
    pub fn constant(amplitude: f32, len: usize, sample_rate: u32) -> Self {
        Self::new(vec![amplitude; len], sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the block contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Reject empty blocks and blocks carrying NaN/inf samples.
    pub fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(LoudctlError::InvalidInput("empty audio block".into()));
        }
        if let Some(idx) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(LoudctlError::InvalidInput(format!(
                "non-finite sample at index {idx}"
            )));
        }
        Ok(())
    }
}
