//! Polling capture sources.
//!
//! `CaptureSource` is what the control loop pulls blocks from. Reads wait
//! at most `timeout`; a missing block is a per-tick error, never a retry loop.
//!
//! `RingCapture` turns the free-running sample stream in the SPSC ring into
//! fixed-size blocks. It always hands out the *newest* `block_size` samples
//! and drops anything older, so each tick measures the present rather than
//! working through a backlog.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::{
    audio::{resample::RateConverter, AudioCapture},
    buffering::{block::AudioBlock, create_audio_ring, AudioConsumer, Consumer},
    config::ControlConfig,
    error::{LoudctlError, Result},
};

/// Scratch size for each ring drain.
const DRAIN_CHUNK: usize = 4_096;

/// Input frames per rubato call.
const RESAMPLE_CHUNK: usize = 1_024;

/// Sleep while waiting for the ring to fill (avoids busy-waiting a core).
const EMPTY_SLEEP: Duration = Duration::from_millis(5);

/// Source of fixed-size mono blocks at the controller sample rate.
pub trait CaptureSource {
    /// Next block, waiting at most `timeout`.
    ///
    /// # Errors
    /// `LoudctlError::CaptureTimeout` when no full block arrived in time,
    /// `LoudctlError::Capture` on device failure.
    fn read_block(&mut self, timeout: Duration) -> Result<AudioBlock>;

    /// Stop delivering audio. Further reads may fail.
    fn stop(&mut self) {}
}

/// Block assembler over the consumer half of the capture ring.
pub struct RingCapture {
    consumer: AudioConsumer,
    resampler: RateConverter,
    block_size: usize,
    sample_rate: u32,
    scratch: Vec<f32>,
    pending: Vec<f32>,
}

impl RingCapture {
    /// # Parameters
    /// - `capture_rate`: rate the producer side writes at (device rate).
    /// - `sample_rate` / `block_size`: what the loop expects per block.
    pub fn new(
        consumer: AudioConsumer,
        capture_rate: u32,
        sample_rate: u32,
        block_size: usize,
    ) -> Result<Self> {
        let resampler = RateConverter::new(capture_rate, sample_rate, RESAMPLE_CHUNK)?;
        debug!(
            capture_rate,
            sample_rate,
            passthrough = resampler.is_passthrough(),
            "ring capture ready"
        );
        Ok(Self {
            consumer,
            resampler,
            block_size: block_size.max(1),
            sample_rate,
            scratch: vec![0.0; DRAIN_CHUNK],
            pending: Vec::with_capacity(block_size * 2),
        })
    }

    /// Move everything currently in the ring into `pending`, keeping at most
    /// one block's worth of the newest samples.
    fn drain(&mut self) {
        loop {
            let n = self.consumer.pop_slice(&mut self.scratch);
            if n == 0 {
                break;
            }
            self.resampler
                .process_into(&self.scratch[..n], &mut self.pending);
            if self.pending.len() > self.block_size {
                let excess = self.pending.len() - self.block_size;
                self.pending.drain(..excess);
            }
        }
    }
}

impl CaptureSource for RingCapture {
    fn read_block(&mut self, timeout: Duration) -> Result<AudioBlock> {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if self.pending.len() >= self.block_size {
                let samples = std::mem::take(&mut self.pending);
                return Ok(AudioBlock::new(samples, self.sample_rate));
            }
            if Instant::now() >= deadline {
                return Err(LoudctlError::CaptureTimeout { timeout });
            }
            std::thread::sleep(EMPTY_SLEEP);
        }
    }

    fn stop(&mut self) {
        self.pending.clear();
    }
}

/// Live microphone: a cpal stream feeding a `RingCapture`.
///
/// **Not `Send`**: owns the `cpal::Stream`. Create and drop it on the loop thread.
pub struct DeviceCapture {
    capture: AudioCapture,
    ring: RingCapture,
    running: Arc<AtomicBool>,
}

impl DeviceCapture {
    /// Open the preferred (or default) input device and start streaming.
    ///
    /// # Errors
    /// `LoudctlError::NoDefaultInputDevice`, `LoudctlError::AudioDevice` or
    /// `LoudctlError::AudioStream` when the stream cannot be acquired.
    pub fn start(config: &ControlConfig, preferred_device: Option<&str>) -> Result<Self> {
        let (producer, consumer) = create_audio_ring();
        let running = Arc::new(AtomicBool::new(true));
        let capture =
            AudioCapture::open_with_preference(producer, Arc::clone(&running), preferred_device)?;
        let ring = RingCapture::new(
            consumer,
            capture.sample_rate,
            config.sample_rate,
            config.block_size,
        )?;
        info!(
            capture_rate = capture.sample_rate,
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            "capture stream started"
        );
        Ok(Self {
            capture,
            ring,
            running,
        })
    }
}

impl CaptureSource for DeviceCapture {
    fn read_block(&mut self, timeout: Duration) -> Result<AudioBlock> {
        if !self.running.load(Ordering::Acquire) {
            return Err(LoudctlError::Capture("capture stream stopped".into()));
        }
        self.ring.read_block(timeout)
    }

    fn stop(&mut self) {
        debug!("stopping capture stream");
        self.capture.stop();
        self.ring.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::Producer;

    #[test]
    fn hands_out_newest_block_and_drops_backlog() {
        let (mut producer, consumer) = create_audio_ring();
        let mut ring = RingCapture::new(consumer, 8_000, 8_000, 4).unwrap();

        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        producer.push_slice(&samples);

        let block = ring.read_block(Duration::from_millis(50)).unwrap();
        assert_eq!(block.samples, vec![0.6, 0.7, 0.8, 0.9]);
        assert_eq!(block.sample_rate, 8_000);
    }

    #[test]
    fn times_out_without_enough_samples() {
        let (mut producer, consumer) = create_audio_ring();
        let mut ring = RingCapture::new(consumer, 8_000, 8_000, 16).unwrap();
        producer.push_slice(&[0.1; 8]);

        let err = ring.read_block(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, LoudctlError::CaptureTimeout { .. }));

        // Partial samples are kept for the next read.
        producer.push_slice(&[0.2; 8]);
        let block = ring.read_block(Duration::from_millis(20)).unwrap();
        assert_eq!(block.len(), 16);
    }

    #[test]
    fn resamples_device_rate_to_controller_rate() {
        let (mut producer, consumer) = create_audio_ring();
        let mut ring = RingCapture::new(consumer, 48_000, 44_100, 512).unwrap();
        producer.push_slice(&vec![0.25; 4_800]);

        let block = ring.read_block(Duration::from_millis(50)).unwrap();
        assert_eq!(block.len(), 512);
        assert_eq!(block.sample_rate, 44_100);
    }
}
