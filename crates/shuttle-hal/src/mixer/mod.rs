//! Mixer control gateway.
//!
//! Wraps the codec's named controls, resolves the fixed control catalog once
//! at start-up and applies [`ControlSet`]s to it.

pub mod routes;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{HalError, MixerError, Result};
use routes::*;

/// Token every enumerated control understands as "disconnected".
pub const ENUM_OFF: &str = "Off";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Boolean,
    Integer { min: i32, max: i32 },
    Enum { options: Vec<String> },
}

impl ControlKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ControlKind::Boolean => "BOOL",
            ControlKind::Integer { .. } => "INT",
            ControlKind::Enum { .. } => "ENUM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    pub id: ControlId,
    pub name: String,
    pub kind: ControlKind,
    pub num_values: usize,
}

/// Access to the kernel mixer of one card.
pub trait MixerDevice: Send {
    fn find_control(&self, name: &str) -> Option<ControlId>;
    fn num_values(&self, id: ControlId) -> usize;
    fn set_value(&mut self, id: ControlId, index: usize, value: i32) -> std::result::Result<(), MixerError>;
    fn set_enum(&mut self, id: ControlId, token: &str) -> std::result::Result<(), MixerError>;
    fn controls(&self) -> Vec<ControlInfo>;
}

/// Value of one route entry: integers are written to every channel of the
/// control, strings select an enum item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Int(i32),
    Enum(String),
}

/// Ordered mapping from control name to value. Inserting an existing name
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, ControlValue)>", into = "Vec<(String, ControlValue)>")]
pub struct ControlSet {
    entries: Vec<(String, ControlValue)>,
}

impl ControlSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ControlValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ControlValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ControlValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<(String, ControlValue)>> for ControlSet {
    fn from(entries: Vec<(String, ControlValue)>) -> Self {
        let mut set = ControlSet::new();
        for (name, value) in entries {
            set.insert(name, value);
        }
        set
    }
}

impl From<ControlSet> for Vec<(String, ControlValue)> {
    fn from(set: ControlSet) -> Self {
        set.entries
    }
}

/// Handles of the controls the HAL drives directly.
#[derive(Debug, Clone, Copy)]
pub struct MixerControls {
    pub pcm_volume: ControlId,
    pub pcm_cap_volume: ControlId,
    pub speaker_volume: ControlId,
    pub speaker_switch: ControlId,
    pub headset_volume: ControlId,
    pub headset_switch: ControlId,
    pub micl_volume: ControlId,
    pub micr_volume: ControlId,
    pub micl_switch: ControlId,
    pub micr_switch: ControlId,
    pub micl_mux: ControlId,
    pub micr_mux: ControlId,
}

impl MixerControls {
    fn resolve(device: &dyn MixerDevice) -> Result<Self> {
        let find = |name: &str| {
            device.find_control(name).ok_or_else(|| {
                error!(control = name, "unable to find mixer control");
                HalError::ControlNotFound(name.to_string())
            })
        };
        Ok(Self {
            pcm_volume: find(PCM_PLAYBACK_VOLUME)?,
            pcm_cap_volume: find(PCM_CAPTURE_VOLUME)?,
            speaker_volume: find(SPEAKER_PLAYBACK_VOLUME)?,
            speaker_switch: find(SPEAKER_PLAYBACK_SWITCH)?,
            headset_volume: find(HEADSET_PLAYBACK_VOLUME)?,
            headset_switch: find(HEADSET_PLAYBACK_SWITCH)?,
            micl_volume: find(MICL_CAPTURE_VOLUME)?,
            micr_volume: find(MICR_CAPTURE_VOLUME)?,
            micl_switch: find(MICL_CAPTURE_SWITCH)?,
            micr_switch: find(MICR_CAPTURE_SWITCH)?,
            micl_mux: find(MICL_CAPTURE_MUX)?,
            micr_mux: find(MICR_CAPTURE_MUX)?,
        })
    }
}

pub struct MixerGateway {
    device: Box<dyn MixerDevice>,
    controls: MixerControls,
}

impl MixerGateway {
    /// Resolves the control catalog. A missing control is fatal; the full
    /// list the driver exposes is dumped to help diagnose the mismatch.
    pub fn open(device: Box<dyn MixerDevice>) -> Result<Self> {
        match MixerControls::resolve(device.as_ref()) {
            Ok(controls) => Ok(Self { device, controls }),
            Err(err) => {
                let catalog = device.controls();
                debug!(count = catalog.len(), "mixer dump");
                for info in &catalog {
                    debug!(index = info.id.0, name = %info.name, kind = info.kind.type_name());
                }
                Err(err)
            }
        }
    }

    pub fn controls(&self) -> &MixerControls {
        &self.controls
    }

    pub fn catalog(&self) -> Vec<ControlInfo> {
        self.device.controls()
    }

    /// Applies every entry of `set` in order. With `enable == false` integer
    /// controls are zeroed and enum controls switched to [`ENUM_OFF`].
    ///
    /// Stops at the first control that cannot be resolved; entries applied
    /// before it are not rolled back.
    pub fn apply_control_set(&mut self, set: &ControlSet, enable: bool) -> Result<()> {
        for (name, value) in set.iter() {
            let id = self
                .device
                .find_control(name)
                .ok_or_else(|| HalError::ControlNotFound(name.to_string()))?;
            match value {
                ControlValue::Enum(token) => {
                    let token = if enable { token.as_str() } else { ENUM_OFF };
                    if let Err(err) = self.device.set_enum(id, token) {
                        warn!(control = name, %err, "failed to select mixer enum");
                    }
                }
                ControlValue::Int(value) => {
                    self.set_all(id, if enable { *value } else { 0 });
                }
            }
        }
        Ok(())
    }

    /// Writes `value` to every channel of the control so stereo pairs move
    /// together.
    pub fn set_all(&mut self, id: ControlId, value: i32) {
        for index in 0..self.device.num_values(id) {
            self.set_channel(id, index, value);
        }
    }

    pub fn set_channel(&mut self, id: ControlId, index: usize, value: i32) {
        if let Err(err) = self.device.set_value(id, index, value) {
            warn!(control = id.0, index, %err, "failed to set mixer value");
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        let value = scale_volume(volume, PCM_VOLUME_MAX);
        let id = self.controls.pcm_volume;
        self.set_channel(id, 0, value);
        self.set_channel(id, 1, value);
    }

    /// Stream volume of the playback path, applied to speaker and headset.
    pub fn set_output_volume(&mut self, left: f32, right: f32) {
        let MixerControls {
            speaker_volume,
            headset_volume,
            ..
        } = self.controls;
        self.set_channel(speaker_volume, 0, scale_volume(left, SPEAKER_VOLUME_MAX));
        self.set_channel(speaker_volume, 1, scale_volume(right, SPEAKER_VOLUME_MAX));
        self.set_channel(headset_volume, 0, scale_volume(left, HEADSET_VOLUME_MAX));
        self.set_channel(headset_volume, 1, scale_volume(right, HEADSET_VOLUME_MAX));
    }

    pub fn set_mic_gain(&mut self, gain: f32) {
        let value = scale_volume(gain, MIC_VOLUME_MAX);
        let MixerControls {
            micl_volume,
            micr_volume,
            ..
        } = self.controls;
        self.set_all(micl_volume, value);
        self.set_all(micr_volume, value);
    }

    pub fn set_mic_switches(&mut self, enabled: bool) {
        let value = i32::from(enabled);
        let MixerControls {
            micl_switch,
            micr_switch,
            ..
        } = self.controls;
        self.set_all(micl_switch, value);
        self.set_all(micr_switch, value);
    }
}
