//! Control names of the codec and the route tables applied to them.

use serde::{Deserialize, Serialize};

use super::{ControlSet, ControlValue};

pub const PCM_PLAYBACK_VOLUME: &str = "Digital Playback Volume";
pub const PCM_CAPTURE_VOLUME: &str = "Digital Capture Volume";

pub const SPEAKER_PLAYBACK_VOLUME: &str = "Line Out Volume";
pub const SPEAKER_PLAYBACK_SWITCH: &str = "Int Spk Switch";

pub const HEADSET_PLAYBACK_VOLUME: &str = "Headphone Volume";
pub const HEADSET_PLAYBACK_SWITCH: &str = "Headphone Switch";

pub const MICL_CAPTURE_VOLUME: &str = "Left Input PGA Volume";
pub const MICR_CAPTURE_VOLUME: &str = "Right Input PGA Volume";
pub const MICL_CAPTURE_SWITCH: &str = "Left Input PGA Switch";
pub const MICR_CAPTURE_SWITCH: &str = "Right Input PGA Switch";
pub const MICL_CAPTURE_MUX: &str = "Left Capture Mux";
pub const MICR_CAPTURE_MUX: &str = "Right Capture Mux";

/// Native integer range of each volume control.
pub const PCM_VOLUME_MAX: i32 = 120;
pub const CAPTURE_VOLUME_MAX: i32 = 120;
pub const MIC_VOLUME_MAX: i32 = 31;
pub const HEADSET_VOLUME_MAX: i32 = 63;
pub const SPEAKER_VOLUME_MAX: i32 = 63;

/// Scales a 0.0..=1.0 level to `0..=max`, truncating like the codec driver
/// expects.
pub fn scale_volume(level: f32, max: i32) -> i32 {
    let level = if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (level * max as f32) as i32
}

/// Route tables consumed by the router. `defaults` is applied once when the
/// device is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTables {
    pub defaults: ControlSet,
    pub headphone: ControlSet,
    pub speaker: ControlSet,
    pub speaker_headphone: ControlSet,
    pub none: ControlSet,
}

impl Default for RouteTables {
    fn default() -> Self {
        Self {
            defaults: default_controls(),
            headphone: playback_switches(true, false),
            speaker: playback_switches(false, true),
            speaker_headphone: playback_switches(true, true),
            none: playback_switches(false, false),
        }
    }
}

fn playback_switches(headphone: bool, speaker: bool) -> ControlSet {
    let mut set = ControlSet::new();
    set.insert(
        HEADSET_PLAYBACK_SWITCH,
        ControlValue::Int(i32::from(headphone)),
    );
    set.insert(SPEAKER_PLAYBACK_SWITCH, ControlValue::Int(i32::from(speaker)));
    set
}

fn default_controls() -> ControlSet {
    let mut set = ControlSet::new();
    set.insert(
        PCM_PLAYBACK_VOLUME,
        ControlValue::Int(scale_volume(0.8, PCM_VOLUME_MAX)),
    );
    set.insert(
        PCM_CAPTURE_VOLUME,
        ControlValue::Int(scale_volume(0.8, CAPTURE_VOLUME_MAX)),
    );
    set.insert(
        SPEAKER_PLAYBACK_VOLUME,
        ControlValue::Int(scale_volume(1.0, SPEAKER_VOLUME_MAX)),
    );
    set.insert(SPEAKER_PLAYBACK_SWITCH, ControlValue::Int(1));
    set.insert(
        HEADSET_PLAYBACK_VOLUME,
        ControlValue::Int(scale_volume(1.0, HEADSET_VOLUME_MAX)),
    );
    set.insert(HEADSET_PLAYBACK_SWITCH, ControlValue::Int(1));
    set.insert(
        MICL_CAPTURE_VOLUME,
        ControlValue::Int(scale_volume(1.0, MIC_VOLUME_MAX)),
    );
    set.insert(
        MICR_CAPTURE_VOLUME,
        ControlValue::Int(scale_volume(1.0, MIC_VOLUME_MAX)),
    );
    set.insert(MICL_CAPTURE_SWITCH, ControlValue::Int(1));
    set.insert(MICR_CAPTURE_SWITCH, ControlValue::Int(1));
    set.insert(MICL_CAPTURE_MUX, ControlValue::Enum("Right".into()));
    set.insert(MICR_CAPTURE_MUX, ControlValue::Enum("Right".into()));
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_scaling_truncates_and_clamps() {
        assert_eq!(scale_volume(0.8, PCM_VOLUME_MAX), 96);
        assert_eq!(scale_volume(0.5, MIC_VOLUME_MAX), 15);
        assert_eq!(scale_volume(1.7, SPEAKER_VOLUME_MAX), 63);
        assert_eq!(scale_volume(-0.2, SPEAKER_VOLUME_MAX), 0);
        assert_eq!(scale_volume(f32::NAN, PCM_VOLUME_MAX), 0);
    }

    #[test]
    fn defaults_cover_every_capture_mux() {
        let defaults = RouteTables::default().defaults;
        assert_eq!(defaults.len(), 12);
        assert_eq!(
            defaults.get(MICR_CAPTURE_MUX),
            Some(&ControlValue::Enum("Right".into()))
        );
    }
}
