//! Microphone capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** block on a mutex or perform I/O, so it only downmixes to
//! mono and pushes into the SPSC ring producer (`push_slice` is lock-free).
//! Block assembly, resampling and loudness estimation all happen on the
//! control loop thread (see [`source::RingCapture`]).
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread; the engine opens it inside its `spawn_blocking` closure.

pub mod device;
pub mod resample;
pub mod source;
pub mod synthetic;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::AudioProducer,
    error::{LoudctlError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active microphone stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on Windows/macOS.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Native capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise the default input
    /// device, otherwise the first available one.
    ///
    /// # Errors
    /// `LoudctlError::NoDefaultInputDevice` when no microphone is available,
    /// `LoudctlError::AudioDevice` / `LoudctlError::AudioStream` when cpal
    /// cannot configure or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();

        let preferred = preferred_device_name.and_then(|wanted| {
            let found = host.input_devices().ok().and_then(|mut devices| {
                devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            });
            if found.is_none() {
                warn!("preferred input device '{wanted}' not found, falling back");
            }
            found
        });

        let device = match preferred.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| LoudctlError::AudioDevice(e.to_string()))?;
                warn!("no default input device, falling back to first available input");
                devices.next().ok_or(LoudctlError::NoDefaultInputDevice)?
            }
        };

        let name = device.name().unwrap_or_default();
        if device::is_loopback_like_name(&name) {
            warn!(
                device = name.as_str(),
                "input looks like a loopback of the output; the controller may chase its own volume"
            );
        }
        info!(device = name.as_str(), "opening input device");

        let supported = device
            .default_input_config()
            .map_err(|e| LoudctlError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let flag = Arc::clone(&running);
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_mono_stream::<f32>(&device, &config, producer, flag, |s| s)
            }
            SampleFormat::I16 => {
                build_mono_stream::<i16>(&device, &config, producer, flag, |s| s as f32 / 32768.0)
            }
            SampleFormat::U16 => build_mono_stream::<u16>(&device, &config, producer, flag, |s| {
                (s as f32 - 32768.0) / 32768.0
            }),
            SampleFormat::U8 => build_mono_stream::<u8>(&device, &config, producer, flag, |s| {
                (s as f32 - 128.0) / 128.0
            }),
            fmt => {
                return Err(LoudctlError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LoudctlError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LoudctlError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(LoudctlError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

/// Build an input stream that downmixes `T` frames to mono f32 and pushes
/// them into `producer`.
#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
    to_f32: fn(T) -> f32,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + Send + 'static,
{
    use crate::buffering::Producer;

    let channels = config.channels as usize;
    let mut mono: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _info: &cpal::InputCallbackInfo| {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            downmix_into(data, channels, &mut mono, to_f32);
            let written = producer.push_slice(&mono);
            if written < mono.len() {
                warn!("ring buffer full: dropped {} frames", mono.len() - written);
            }
        },
        |err| error!("audio stream error: {err}"),
        None,
    )
}

/// Average interleaved `channels`-wide frames into `out` (cleared first).
/// A trailing partial frame is ignored.
pub fn downmix_into<T: Copy>(data: &[T], channels: usize, out: &mut Vec<f32>, to_f32: fn(T) -> f32) {
    let channels = channels.max(1);
    out.clear();
    out.extend(
        data.chunks_exact(channels)
            .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / channels as f32),
    );
}
