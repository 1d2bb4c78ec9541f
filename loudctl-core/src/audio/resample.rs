//! Converts captured audio to the controller's sample rate.
//!
//! Devices usually run at 48 kHz while history sizing and block length are
//! expressed at the configured rate (44.1 kHz by default). Conversion runs
//! on the control loop thread, never inside the cpal callback. Matching
//! rates skip rubato entirely.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{LoudctlError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// Absent when the rates already match.
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input frames carried between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// One channel sized for rubato's largest output.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// `chunk_size` is the number of capture-rate samples rubato consumes
    /// per call. Fails with `AudioDevice` when rubato rejects the ratio.
    pub fn new(capture_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| LoudctlError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        tracing::info!(capture_rate, target_rate, chunk_size, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Convert `samples`, appending whatever output is ready to `out`.
    ///
    /// Input is buffered until a full `chunk_size` frame is available for
    /// rubato; the remainder waits for the next call. In passthrough mode the
    /// input is appended as-is.
    pub fn process_into(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        let Some(ref mut resampler) = self.resampler else {
            out.extend_from_slice(samples);
            return;
        };

        self.input_buf.extend_from_slice(samples);

        let mut consumed = 0;
        while self.input_buf.len() - consumed >= self.chunk_size {
            let frame = &self.input_buf[consumed..consumed + self.chunk_size];
            match resampler.process_into_buffer(&[frame], &mut self.output_buf, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.output_buf[0][..produced]),
                Err(e) => error!("resampler process error: {e}"),
            }
            consumed += self.chunk_size;
        }
        self.input_buf.drain(..consumed);
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(rc: &mut RateConverter, samples: &[f32]) -> Vec<f32> {
        let mut out = Vec::new();
        rc.process_into(samples, &mut out);
        out
    }

    #[test]
    fn matching_rates_copy_samples_through() {
        let mut rc = RateConverter::new(44_100, 44_100, 1024).unwrap();
        assert!(rc.is_passthrough());
        let block: Vec<f32> = (0..300).map(|i| (i % 7) as f32 * 0.1 - 0.3).collect();
        assert_eq!(convert(&mut rc, &block), block);
    }

    #[test]
    fn device_rate_block_shrinks_by_rate_ratio() {
        let mut rc = RateConverter::new(48_000, 44_100, 2048).unwrap();
        assert!(!rc.is_passthrough());
        // 2048 * 44.1 / 48 = 1881.6
        let out = convert(&mut rc, &vec![0.1f32; 2048]);
        assert!(out.len().abs_diff(1882) <= 16, "len={}", out.len());
    }

    #[test]
    fn constant_level_survives_conversion() {
        let mut rc = RateConverter::new(48_000, 44_100, 1024).unwrap();
        convert(&mut rc, &vec![0.25f32; 1024]);
        let out = convert(&mut rc, &vec![0.25f32; 1024]);
        assert!(!out.is_empty());
        let mean = out.iter().sum::<f32>() / out.len() as f32;
        assert!((mean - 0.25).abs() < 0.02, "mean={mean}");
    }

    #[test]
    fn short_reads_are_held_until_a_chunk_fills() {
        let mut rc = RateConverter::new(48_000, 44_100, 1024).unwrap();
        assert!(convert(&mut rc, &vec![0.0f32; 600]).is_empty());
        assert!(!convert(&mut rc, &vec![0.0f32; 600]).is_empty());
    }
}
