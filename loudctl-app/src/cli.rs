//! Command-line flags. Every flag that maps to a setting overrides the value
//! loaded from the settings file for this run only, unless `--write-settings`
//! is also given.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::settings::AppSettings;

#[derive(Debug, Parser)]
#[command(name = "loudctl")]
#[command(about = "Adjust output volume to the ambient noise level heard by the microphone", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Settings file path (defaults to the platform data directory)
    #[arg(long, env = "LOUDCTL_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Input device name (use --list-devices to see options)
    #[arg(short, long)]
    pub device: Option<String>,

    /// List available input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Drive an in-process level instead of the system mixer
    #[arg(long)]
    pub dry_run: bool,

    /// Volume adjustment policy
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// PulseAudio/PipeWire sink to control
    #[arg(long)]
    pub sink: Option<String>,

    /// Lowest level the controller will set, in [0, 1]
    #[arg(long)]
    pub min_volume: Option<f32>,

    /// Highest level the controller will set, in [0, 1]
    #[arg(long)]
    pub max_volume: Option<f32>,

    /// Show a rolling meter instead of a single status line
    #[arg(short, long)]
    pub meter: bool,

    /// Save the effective settings (file + flags) and continue
    #[arg(long)]
    pub write_settings: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Hysteresis,
    Proportional,
}

impl Cli {
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(device) = &self.device {
            settings.preferred_input_device = Some(device.clone());
        }
        if self.dry_run {
            settings.actuator = "software".into();
        }
        if let Some(policy) = self.policy {
            settings.policy = match policy {
                PolicyArg::Hysteresis => "hysteresis".into(),
                PolicyArg::Proportional => "proportional".into(),
            };
        }
        if let Some(sink) = &self.sink {
            settings.pactl_sink = sink.clone();
        }
        if let Some(min) = self.min_volume {
            settings.min_volume = min;
        }
        if let Some(max) = self.max_volume {
            settings.max_volume = max;
        }
        settings.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::try_parse_from([
            "loudctl",
            "--device",
            "USB Mic",
            "--dry-run",
            "--policy",
            "proportional",
            "--max-volume",
            "0.7",
        ])
        .unwrap();
        let mut settings = AppSettings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings.preferred_input_device.as_deref(), Some("USB Mic"));
        assert_eq!(settings.actuator, "software");
        assert_eq!(settings.policy, "proportional");
        assert_eq!(settings.max_volume, 0.7);
        assert_eq!(settings.min_volume, 0.2);
    }

    #[test]
    fn no_flags_leave_settings_alone() {
        let cli = Cli::try_parse_from(["loudctl"]).unwrap();
        let mut settings = AppSettings {
            pactl_sink: "alsa_output.usb".into(),
            ..AppSettings::default()
        };
        let before = settings.clone();
        cli.apply_to(&mut settings);
        assert_eq!(settings, before);
        assert!(!cli.meter && !cli.list_devices && !cli.write_settings);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(["loudctl", "--policy", "random"]).is_err());
    }
}
