//! Persistent application settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use loudctl_core::{ControlConfig, PolicyKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    /// `pactl` or `software`.
    pub actuator: String,
    pub pactl_sink: String,
    /// `hysteresis` or `proportional`.
    pub policy: String,
    pub smoothing_factor: f32,
    pub min_volume: f32,
    pub max_volume: f32,
    pub rolling_window_secs: u64,
    pub calc_interval_secs: u64,
    pub stability_margin: f32,
    pub step_up: f32,
    pub step_down: f32,
    pub tick_interval_ms: u64,
    pub meter_width: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            actuator: "pactl".into(),
            pactl_sink: "@DEFAULT_SINK@".into(),
            policy: "hysteresis".into(),
            smoothing_factor: 0.2,
            min_volume: 0.2,
            max_volume: 0.95,
            rolling_window_secs: 40,
            calc_interval_secs: 4,
            stability_margin: 0.4,
            step_up: 0.08,
            step_down: 0.08,
            tick_interval_ms: 100,
            meter_width: 100,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.actuator = normalize_actuator(&self.actuator);
        self.policy = normalize_policy(&self.policy);
        self.pactl_sink = match self.pactl_sink.trim() {
            "" => "@DEFAULT_SINK@".into(),
            sink => sink.to_string(),
        };
        self.smoothing_factor = finite_or(self.smoothing_factor, 0.2).clamp(0.01, 1.0);
        self.min_volume = finite_or(self.min_volume, 0.2).clamp(0.0, 1.0);
        self.max_volume = finite_or(self.max_volume, 0.95).clamp(0.0, 1.0);
        if self.min_volume > self.max_volume {
            std::mem::swap(&mut self.min_volume, &mut self.max_volume);
        }
        self.rolling_window_secs = self.rolling_window_secs.clamp(1, 3_600);
        self.calc_interval_secs = self.calc_interval_secs.clamp(1, 3_600);
        self.stability_margin = finite_or(self.stability_margin, 0.4).clamp(0.0, 50.0);
        self.step_up = finite_or(self.step_up, 0.08).clamp(0.0, 1.0);
        self.step_down = finite_or(self.step_down, 0.08).clamp(0.0, 1.0);
        self.tick_interval_ms = self.tick_interval_ms.clamp(10, 5_000);
        self.meter_width = self.meter_width.clamp(10, 400);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    /// Controller configuration for these settings. Fields not exposed in
    /// the settings file keep their core defaults.
    pub fn to_control_config(&self) -> ControlConfig {
        let policy = match self.policy.as_str() {
            "proportional" => PolicyKind::proportional_default(),
            _ => PolicyKind::Hysteresis,
        };
        ControlConfig {
            smoothing_factor: self.smoothing_factor,
            min_volume: self.min_volume,
            max_volume: self.max_volume,
            rolling_window: Duration::from_secs(self.rolling_window_secs),
            calc_interval: Duration::from_secs(self.calc_interval_secs),
            stability_margin: self.stability_margin,
            step_up: self.step_up,
            step_down: self.step_down,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            policy,
            ..ControlConfig::default()
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub fn normalize_actuator(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "software" | "dry-run" | "dry_run" | "none" => "software".into(),
        _ => "pactl".into(),
    }
}

pub fn normalize_policy(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "proportional" | "gain" | "suggest" => "proportional".into(),
        _ => "hysteresis".into(),
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("loudctl")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("loudctl")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!(path = ?path, "ignoring malformed settings file: {e}");
                None
            }
        })
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
