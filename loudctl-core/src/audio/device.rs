//! Input device enumeration.
//!
//! A loopback / "monitor" input hears the speakers rather than the room, so a
//! controller listening to one would react to its own volume changes. Such
//! devices are flagged and never recommended.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
    /// Heuristic flag for devices that capture system output.
    pub is_loopback_like: bool,
    /// Best guess for a real room microphone.
    pub is_recommended: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "virtual output",
    "monitor of",
    ".monitor",
    "mix stereo",
    "speakers (",
    "headphones (",
];

const ROOM_MIC_KEYWORDS: &[&str] = &[
    "microphone",
    "mic",
    "array",
    "webcam",
    "internal",
    "built-in",
    "usb",
    "input",
];

/// Best-effort heuristic for loopback/system-output capture devices.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Score a device name for how likely it hears the room. Higher is better.
pub fn ambient_input_score(name: &str) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = if is_loopback_like_name(&lowered) { -16 } else { 8 };
    if ROOM_MIC_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    if lowered.contains("default") {
        score += 1;
    }
    score
}

/// Mark the best non-loopback device as recommended and sort the list so it
/// comes first, followed by other real inputs, then loopbacks.
pub fn rank_devices(mut list: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    let best = list
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.is_loopback_like)
        .max_by_key(|(_, d)| ambient_input_score(&d.name) + if d.is_default { 2 } else { 0 })
        .map(|(idx, _)| idx);
    if let Some(idx) = best {
        list[idx].is_recommended = true;
    }
    list.sort_by_key(|d| {
        (
            !d.is_recommended,
            d.is_loopback_like,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
    list
}

/// List all available audio input devices, best candidate first.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            return host
                .default_input_device()
                .map(|d| {
                    let name = d.name().unwrap_or_else(|_| "Default Input Device".into());
                    rank_devices(vec![DeviceInfo {
                        is_loopback_like: is_loopback_like_name(&name),
                        name,
                        is_default: true,
                        is_recommended: false,
                    }])
                })
                .unwrap_or_default();
        }
    };

    let list = devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
            DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                is_loopback_like: is_loopback_like_name(&name),
                is_recommended: false,
                name,
            }
        })
        .collect();
    rank_devices(list)
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            is_default,
            is_loopback_like: is_loopback_like_name(name),
            is_recommended: false,
        }
    }

    #[test]
    fn detects_common_loopback_names() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("Monitor of Built-in Audio Analog Stereo"));
        assert!(is_loopback_like_name("alsa_output.pci-0000_00_1f.3.analog-stereo.monitor"));
        assert!(!is_loopback_like_name("Built-in Microphone"));
    }

    #[test]
    fn scores_room_mic_higher_than_loopback() {
        let mic = ambient_input_score("Microphone Array (USB PnP Audio Device)");
        let loopback = ambient_input_score("Stereo Mix (Realtek Audio)");
        assert!(mic > loopback);
    }

    #[test]
    fn loopback_default_is_never_recommended() {
        let ranked = rank_devices(vec![
            info("Monitor of Speakers", true),
            info("Webcam Microphone", false),
        ]);
        assert_eq!(ranked[0].name, "Webcam Microphone");
        assert!(ranked[0].is_recommended);
        assert!(!ranked[1].is_recommended);
    }

    #[test]
    fn only_loopbacks_means_no_recommendation() {
        let ranked = rank_devices(vec![info("Stereo Mix", true)]);
        assert!(ranked.iter().all(|d| !d.is_recommended));
    }
}
