//! PulseAudio / PipeWire sink volume through the `pactl` command line.
//!
//! `pactl get-sink-volume` prints one `raw / percent / dB` triple per channel:
//!
//! ```text
//! Volume: front-left: 39321 /  60% / -13.31 dB,   front-right: 39321 /  60% / -13.31 dB
//!         balance 0.00
//! ```
//!
//! The first channel's raw value is read; writes use raw units so the level
//! is not quantised to whole percent.

use std::process::Command;

use tracing::debug;

use crate::actuator::VolumeActuator;
use crate::error::{LoudctlError, Result};

/// Raw volume corresponding to 100 % (`PA_VOLUME_NORM`).
pub const PA_VOLUME_NORM: u32 = 65_536;

/// Sink name understood by `pactl` as "whatever the default output is".
pub const DEFAULT_SINK: &str = "@DEFAULT_SINK@";

#[derive(Debug, Clone)]
pub struct PactlActuator {
    program: String,
    sink: String,
}

impl PactlActuator {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            program: "pactl".into(),
            sink: sink.into(),
        }
    }

    /// Use a different executable (e.g. an absolute path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| LoudctlError::Actuator(format!("failed to run {}: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoudctlError::Actuator(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for PactlActuator {
    fn default() -> Self {
        Self::new(DEFAULT_SINK)
    }
}

impl VolumeActuator for PactlActuator {
    fn get_current_level(&mut self) -> Result<f32> {
        let stdout = self.run(&["get-sink-volume", self.sink.as_str()])?;
        parse_sink_volume(&stdout).ok_or_else(|| {
            LoudctlError::Actuator(format!("unrecognised pactl output: {}", stdout.trim()))
        })
    }

    fn set_level(&mut self, level: f32) -> Result<()> {
        let raw = (level.clamp(0.0, 1.0) * PA_VOLUME_NORM as f32).round() as u32;
        debug!(level, raw, sink = %self.sink, "pactl set-sink-volume");
        self.run(&["set-sink-volume", self.sink.as_str(), raw.to_string().as_str()])?;
        Ok(())
    }

    fn name(&self) -> &str {
        "pactl"
    }
}

/// First channel's volume as a fraction of `PA_VOLUME_NORM`.
///
/// Prefers the raw value (`39321 /`); falls back to the first percentage.
pub fn parse_sink_volume(output: &str) -> Option<f32> {
    let tokens: Vec<&str> = output.split_whitespace().collect();

    let raw = tokens
        .windows(2)
        .find_map(|pair| match pair {
            [value, "/"] => value.parse::<u32>().ok(),
            _ => None,
        });
    if let Some(raw) = raw {
        return Some(raw as f32 / PA_VOLUME_NORM as f32);
    }

    tokens
        .iter()
        .filter_map(|t| t.trim_end_matches(',').strip_suffix('%'))
        .find_map(|pct| pct.parse::<f32>().ok())
        .map(|pct| pct / 100.0)
}
