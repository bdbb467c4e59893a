//! Stream formats, hardware presets and the loadable HAL configuration.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mixer::routes::RouteTables;

/// Sound card hosting the codec, SCO and digital PCM devices.
pub const DEFAULT_CARD: u32 = 0;

pub const OUT_PERIOD_SIZE: u32 = 880;
pub const OUT_SHORT_PERIOD_COUNT: u32 = 2;
pub const OUT_LONG_PERIOD_COUNT: u32 = 8;
pub const OUT_SAMPLING_RATE: u32 = 44_100;

pub const IN_PERIOD_SIZE: u32 = 1024;
pub const IN_PERIOD_COUNT: u32 = 4;
pub const IN_SAMPLING_RATE: u32 = 44_100;

pub const SCO_PERIOD_SIZE: u32 = 256;
pub const SCO_PERIOD_COUNT: u32 = 4;
pub const SCO_SAMPLING_RATE: u32 = 8_000;

/// Captured frames forced to silence after the input path powers up, so the
/// codec pop never reaches the application.
pub const FRAMES_MUTED_AT_CAPTURE_START: u32 = 2048;

/// Excess below this is not worth sleeping for in the write path.
pub const MIN_WRITE_SLEEP_US: u64 = 2_000;
/// Upper bound of the accumulated pacing sleep in a single write.
pub const MAX_WRITE_SLEEP_US: u64 = (OUT_PERIOD_SIZE as u64
    * OUT_SHORT_PERIOD_COUNT as u64
    * 1_000_000)
    / OUT_SAMPLING_RATE as u64;

/// Bytes per frame of the format exchanged with the framework (16-bit stereo).
pub const FRAME_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    Pcm16,
    Pcm8,
    Pcm24,
    Pcm32,
    Float,
}

impl SampleFormat {
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::Pcm16 => "pcm16",
            SampleFormat::Pcm8 => "pcm8",
            SampleFormat::Pcm24 => "pcm24",
            SampleFormat::Pcm32 => "pcm32",
            SampleFormat::Float => "float",
        }
    }
}

/// Stream format negotiated with the framework at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl AudioConfig {
    pub fn new(sample_rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            format,
        }
    }

    /// The only format the playback path accepts.
    pub fn playback_default() -> Self {
        Self::new(OUT_SAMPLING_RATE, 2, SampleFormat::Pcm16)
    }

    pub fn capture_default() -> Self {
        Self::new(IN_SAMPLING_RATE, 2, SampleFormat::Pcm16)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::playback_default()
    }
}

impl fmt::Display for AudioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}",
            self.sample_rate,
            self.channels,
            self.format.name()
        )
    }
}

/// Hardware parameters handed to the PCM driver when a handle is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmConfig {
    pub channels: u32,
    pub rate: u32,
    pub period_size: u32,
    pub period_count: u32,
    pub format: SampleFormat,
    pub start_threshold: u32,
    pub stop_threshold: u32,
}

impl PcmConfig {
    /// Main codec playback. The hardware buffer is always sized for the long
    /// period count; the write threshold decides how much of it is used.
    pub const fn main_out() -> Self {
        Self {
            channels: 2,
            rate: OUT_SAMPLING_RATE,
            period_size: OUT_PERIOD_SIZE,
            period_count: OUT_LONG_PERIOD_COUNT,
            format: SampleFormat::Pcm16,
            start_threshold: OUT_PERIOD_SIZE * OUT_SHORT_PERIOD_COUNT,
            stop_threshold: 0,
        }
    }

    pub const fn main_in() -> Self {
        Self {
            channels: 2,
            rate: IN_SAMPLING_RATE,
            period_size: IN_PERIOD_SIZE,
            period_count: IN_PERIOD_COUNT,
            format: SampleFormat::Pcm16,
            start_threshold: 1,
            stop_threshold: IN_PERIOD_SIZE * IN_PERIOD_COUNT,
        }
    }

    /// Bluetooth SCO link, fixed narrowband format in both directions.
    pub const fn sco() -> Self {
        Self {
            channels: 1,
            rate: SCO_SAMPLING_RATE,
            period_size: SCO_PERIOD_SIZE,
            period_count: SCO_PERIOD_COUNT,
            format: SampleFormat::Pcm16,
            start_threshold: 0,
            stop_threshold: 0,
        }
    }

    pub fn buffer_frames(&self) -> u32 {
        self.period_size * self.period_count
    }
}

/// Board level configuration. Everything defaults to the built-in tables, so
/// a JSON override only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub card: u32,
    pub capture_mute_frames: u32,
    pub routes: RouteTables,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            card: DEFAULT_CARD,
            capture_mute_frames: FRAMES_MUTED_AT_CAPTURE_START,
            routes: RouteTables::default(),
        }
    }
}

impl HalConfig {
    pub fn from_json_str(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
